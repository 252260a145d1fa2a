//! Models for the MyGeotab JSON-RPC API.
//!
//! These types match the JSON structure returned by `Get`, `Authenticate`
//! and `GetAddresses`. Every record here is transient: the adapter fetches
//! it, the normalizer reads it once, and it is dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Shared Types
// =============================================================================

/// Reference to another Geotab entity.
///
/// Well-known entities (e.g. `"ControllerNoneId"`) are serialized as bare id
/// strings, everything else as an object carrying at least an `id`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityRef {
    pub id: String,
    pub name: Option<String>,
}

impl<'de> Deserialize<'de> for EntityRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawRef {
            Id(String),
            Object {
                id: String,
                #[serde(default)]
                name: Option<String>,
            },
        }

        Ok(match RawRef::deserialize(deserializer)? {
            RawRef::Id(id) => EntityRef { id, name: None },
            RawRef::Object { id, name } => EntityRef { id, name },
        })
    }
}

/// A point on the map. Geotab uses `x` for longitude and `y` for latitude.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            x: longitude,
            y: latitude,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.y
    }

    pub fn longitude(&self) -> f64 {
        self.x
    }

    /// Devices without a GPS fix report (0, 0); those are not worth geocoding.
    pub fn is_known(&self) -> bool {
        self.x != 0.0 || self.y != 0.0
    }
}

/// Inclusive time range used for every historical search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// The window of `span` ending at `as_of`.
    pub fn ending_at(as_of: DateTime<Utc>, span: chrono::Duration) -> Self {
        Self {
            from: as_of - span,
            to: as_of,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && instant <= self.to
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A telematics device (vehicle unit) in the account.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub groups: Vec<EntityRef>,
    #[serde(default)]
    pub active_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active_to: Option<DateTime<Utc>>,
}

/// Latest known state of a device.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusInfo {
    #[serde(default)]
    pub device: Option<EntityRef>,
    #[serde(default)]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub bearing: Option<f64>,
    #[serde(default)]
    pub is_driving: bool,
    #[serde(default)]
    pub is_device_communicating: bool,
}

impl DeviceStatusInfo {
    pub fn coordinate(&self) -> Option<Coordinate> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
            _ => None,
        }
    }
}

/// A single driving segment between an ignition-on and the following stop.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    #[serde(default)]
    pub device: Option<EntityRef>,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    /// Kilometres.
    #[serde(default)]
    pub distance: Option<f64>,
    /// Time-span strings, e.g. `"01:02:03.0000000"` or `"1.02:03:04"`.
    #[serde(default)]
    pub driving_duration: Option<String>,
    #[serde(default)]
    pub idling_duration: Option<String>,
    #[serde(default)]
    pub stop_duration: Option<String>,
    #[serde(default)]
    pub next_trip_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub maximum_speed: Option<f64>,
    #[serde(default)]
    pub average_speed: Option<f64>,
    #[serde(default)]
    pub stop_point: Option<Coordinate>,
}

/// A diagnostic trouble code event.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultData {
    pub id: String,
    #[serde(default)]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub device: Option<EntityRef>,
    #[serde(default)]
    pub diagnostic: Option<EntityRef>,
    #[serde(default)]
    pub controller: Option<EntityRef>,
    #[serde(default)]
    pub failure_mode: Option<EntityRef>,
    #[serde(default)]
    pub fault_state: Option<String>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub malfunction_lamp: Option<bool>,
}

impl FaultData {
    pub fn is_active(&self) -> bool {
        self.fault_state
            .as_deref()
            .is_some_and(|state| state.eq_ignore_ascii_case("active"))
    }
}

/// A raw engine/diagnostic reading.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    pub id: String,
    #[serde(default)]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub device: Option<EntityRef>,
    #[serde(default)]
    pub diagnostic: Option<EntityRef>,
    #[serde(default)]
    pub data: Option<f64>,
}

// =============================================================================
// Adapter Output Records
// =============================================================================

/// Current position of a device with its reverse-geocoded address.
#[derive(Clone, Debug)]
pub struct DeviceLocation {
    pub device_id: String,
    pub status: DeviceStatusInfo,
    pub address: Option<String>,
}

/// A trip together with the address of the point where it ended.
#[derive(Clone, Debug)]
pub struct TripRecord {
    pub trip: Trip,
    pub stop_address: Option<String>,
}

impl From<Trip> for TripRecord {
    fn from(trip: Trip) -> Self {
        Self {
            trip,
            stop_address: None,
        }
    }
}

// =============================================================================
// JSON-RPC Envelope
// =============================================================================

/// Session credentials returned by `Authenticate` and sent with every call.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub database: String,
    pub session_id: String,
    pub user_name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoginResult {
    pub credentials: Credentials,
    /// `"ThisServer"` or the host that owns the database.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<T> {
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// Error object of a failed call.
///
/// Older servers list exceptions under `errors[].name`, newer ones put the
/// exception type in `data.type`.
#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub errors: Vec<JsonRpcInnerError>,
    #[serde(default)]
    pub data: Option<JsonRpcErrorData>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcInnerError {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcErrorData {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}

impl JsonRpcError {
    /// All exception type names mentioned by the error.
    pub fn exception_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        if let Some(name) = self.name.as_deref() {
            names.push(name);
        }
        names.extend(self.errors.iter().filter_map(|e| e.name.as_deref()));
        if let Some(error_type) = self.data.as_ref().and_then(|d| d.error_type.as_deref()) {
            names.push(error_type);
        }
        names
    }

    pub fn is_invalid_user(&self) -> bool {
        self.exception_names()
            .iter()
            .any(|name| name.contains("InvalidUserException"))
    }
}

/// One entry of a `GetAddresses` result.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseGeocodeAddress {
    #[serde(default)]
    pub formatted_address: Option<String>,
}
