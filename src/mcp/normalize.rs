//! Result Normalizer
//!
//! Pure conversions from adapter records to operation payloads. Nothing here
//! reads the clock: every time-dependent decision takes an explicit `as_of`
//! or window, so identical input always yields an identical payload.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::geotab::{
    Coordinate, Device, DeviceLocation, EntityRef, FaultData, StatusData, TimeWindow,
    TripRecord,
};

// ============================================================================
// Shared
// ============================================================================

/// A resolved point on the map
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Place {
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
}

impl Place {
    fn at(point: Option<Coordinate>, address: Option<&String>) -> Option<Self> {
        point.filter(Coordinate::is_known).map(|p| Place {
            latitude: p.latitude(),
            longitude: p.longitude(),
            address: address.cloned(),
        })
    }
}

fn entity_id(entity: Option<&EntityRef>) -> Option<String> {
    entity.map(|e| e.id.clone())
}

/// Parse a Geotab time-span string (`[-][d.]hh:mm:ss[.fffffff]`) into seconds.
pub fn parse_timespan(text: &str) -> Option<f64> {
    let text = text.trim();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let mut parts = text.split(':');
    let head = parts.next()?;
    let minutes = parts.next()?;
    let seconds = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let (days, hours) = match head.split_once('.') {
        Some((days, hours)) => (days.parse::<u64>().ok()?, hours.parse::<u64>().ok()?),
        None => (0, head.parse::<u64>().ok()?),
    };
    let minutes = minutes.parse::<u64>().ok()?;
    let seconds = seconds.parse::<f64>().ok()?;
    if minutes >= 60 || !seconds.is_finite() || !(0.0..60.0).contains(&seconds) {
        return None;
    }

    let total = days as f64 * 86_400.0 + hours as f64 * 3_600.0 + minutes as f64 * 60.0 + seconds;
    Some(if negative { -total } else { total })
}

fn whole_seconds(seconds: f64) -> i64 {
    seconds.round() as i64
}

// ============================================================================
// get_devices
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeviceSummary {
    pub id: String,
    pub name: Option<String>,
    pub serial_number: Option<String>,
    pub device_type: Option<String>,
    pub active: bool,
    pub groups: Vec<String>,
    pub product_id: Option<i64>,
    pub active_from: Option<DateTime<Utc>>,
    pub active_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DevicesPayload {
    pub devices: Vec<DeviceSummary>,
    pub count: usize,
}

/// A device is active while its `active_to` lies in the future (or is unset).
pub fn is_device_active(device: &Device, as_of: DateTime<Utc>) -> bool {
    device.active_to.map_or(true, |active_to| active_to > as_of)
}

pub fn normalize_devices(
    devices: &[Device],
    include_inactive: bool,
    as_of: DateTime<Utc>,
) -> DevicesPayload {
    let devices: Vec<DeviceSummary> = devices
        .iter()
        .map(|device| DeviceSummary {
            id: device.id.clone(),
            name: device.name.clone(),
            serial_number: device.serial_number.clone(),
            device_type: device.device_type.clone(),
            active: is_device_active(device, as_of),
            groups: device.groups.iter().map(|g| g.id.clone()).collect(),
            product_id: device.product_id,
            active_from: device.active_from,
            active_to: device.active_to,
        })
        .filter(|summary| include_inactive || summary.active)
        .collect();

    DevicesPayload {
        count: devices.len(),
        devices,
    }
}

// ============================================================================
// get_device_location
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LocationSummary {
    pub device_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<f64>,
    pub bearing: Option<f64>,
    pub address: Option<String>,
    pub is_driving: bool,
    pub is_communicating: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LocationPayload {
    pub location: LocationSummary,
}

pub fn normalize_location(location: &DeviceLocation) -> LocationPayload {
    let status = &location.status;
    LocationPayload {
        location: LocationSummary {
            device_id: location.device_id.clone(),
            timestamp: status.date_time,
            latitude: status.latitude,
            longitude: status.longitude,
            speed: status.speed,
            bearing: status.bearing,
            address: location.address.clone(),
            is_driving: status.is_driving,
            is_communicating: status.is_device_communicating,
        },
    }
}

// ============================================================================
// get_trips
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TripSummary {
    pub id: String,
    pub device_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i64,
    pub distance_km: Option<f64>,
    pub start_location: Option<Place>,
    pub end_location: Option<Place>,
    pub max_speed: Option<f64>,
    pub average_speed: Option<f64>,
    pub idle_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StopSummary {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i64,
    pub location: Option<Place>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TripsPayload {
    pub device_id: String,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub trips: Vec<TripSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stops: Option<Vec<StopSummary>>,
    pub count: usize,
}

/// Trips starting inside `window`, oldest first.
///
/// A trip's start location is where the previous trip stopped, including a
/// previous trip that started before the window.
pub fn normalize_trips(
    device_id: &str,
    records: &[TripRecord],
    window: TimeWindow,
    include_stops: bool,
) -> TripsPayload {
    let mut ordered: Vec<&TripRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        a.trip
            .start
            .cmp(&b.trip.start)
            .then_with(|| a.trip.id.cmp(&b.trip.id))
    });

    let mut trips = Vec::new();
    let mut stops = Vec::new();
    let mut previous_stop: Option<Place> = None;

    for (i, record) in ordered.iter().enumerate() {
        let trip = &record.trip;
        let end_location = Place::at(trip.stop_point, record.stop_address.as_ref());
        let start_location = previous_stop.take();
        previous_stop = end_location.clone();

        if !window.contains(trip.start) {
            continue;
        }

        if include_stops {
            let following = ordered.get(i + 1).map(|next| next.trip.start);
            if let Some(stop) = stop_after(record, following, end_location.clone()) {
                stops.push(stop);
            }
        }

        let duration = trip
            .driving_duration
            .as_deref()
            .and_then(parse_timespan)
            .unwrap_or_else(|| (trip.stop - trip.start).num_milliseconds() as f64 / 1000.0);

        trips.push(TripSummary {
            id: trip.id.clone(),
            device_id: trip
                .device
                .as_ref()
                .map_or_else(|| device_id.to_string(), |d| d.id.clone()),
            start_time: trip.start,
            end_time: trip.stop,
            duration_seconds: whole_seconds(duration),
            distance_km: trip.distance,
            start_location,
            end_location,
            max_speed: trip.maximum_speed,
            average_speed: trip.average_speed,
            idle_seconds: trip
                .idling_duration
                .as_deref()
                .and_then(parse_timespan)
                .map(whole_seconds),
        });
    }

    TripsPayload {
        device_id: device_id.to_string(),
        from_date: window.from,
        to_date: window.to,
        count: trips.len(),
        trips,
        stops: include_stops.then_some(stops),
    }
}

/// `instant` moved by `seconds`, or `None` when the result is unrepresentable.
fn offset_by_seconds(instant: DateTime<Utc>, seconds: f64) -> Option<DateTime<Utc>> {
    let millis = (seconds * 1000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    let span = chrono::Duration::try_milliseconds(millis as i64)?;
    instant.checked_add_signed(span)
}

/// The stop that follows a trip, if its end is known.
fn stop_after(
    record: &TripRecord,
    following_start: Option<DateTime<Utc>>,
    location: Option<Place>,
) -> Option<StopSummary> {
    let trip = &record.trip;
    let end_time = trip
        .next_trip_start
        .or_else(|| {
            trip.stop_duration
                .as_deref()
                .and_then(parse_timespan)
                .and_then(|seconds| offset_by_seconds(trip.stop, seconds))
        })
        .or(following_start)?;

    if end_time <= trip.stop {
        return None;
    }

    Some(StopSummary {
        start_time: trip.stop,
        end_time,
        duration_seconds: (end_time - trip.stop).num_seconds(),
        location,
    })
}

// ============================================================================
// get_fault_data
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FaultSummary {
    pub id: String,
    pub device_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub diagnostic_id: Option<String>,
    pub diagnostic_name: Option<String>,
    pub controller_id: Option<String>,
    pub failure_mode_id: Option<String>,
    pub fault_state: Option<String>,
    pub active: bool,
    pub count: Option<i64>,
    pub malfunction_lamp: Option<bool>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FaultsPayload {
    pub device_id: String,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub active_only: bool,
    pub faults: Vec<FaultSummary>,
    pub count: usize,
}

/// Faults of a device, newest first.
pub fn normalize_faults(
    device_id: &str,
    faults: &[FaultData],
    window: TimeWindow,
    active_only: bool,
) -> FaultsPayload {
    let mut selected: Vec<&FaultData> = faults
        .iter()
        .filter(|fault| !active_only || fault.is_active())
        .collect();
    selected.sort_by(|a, b| b.date_time.cmp(&a.date_time).then_with(|| a.id.cmp(&b.id)));

    let faults: Vec<FaultSummary> = selected
        .into_iter()
        .map(|fault| FaultSummary {
            id: fault.id.clone(),
            device_id: entity_id(fault.device.as_ref()).or_else(|| Some(device_id.to_string())),
            timestamp: fault.date_time,
            diagnostic_id: entity_id(fault.diagnostic.as_ref()),
            diagnostic_name: fault.diagnostic.as_ref().and_then(|d| d.name.clone()),
            controller_id: entity_id(fault.controller.as_ref()),
            failure_mode_id: entity_id(fault.failure_mode.as_ref()),
            fault_state: fault.fault_state.clone(),
            active: fault.is_active(),
            count: fault.count,
            malfunction_lamp: fault.malfunction_lamp,
        })
        .collect();

    FaultsPayload {
        device_id: device_id.to_string(),
        from_date: window.from,
        to_date: window.to,
        active_only,
        count: faults.len(),
        faults,
    }
}

// ============================================================================
// get_status_data
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusReading {
    pub id: String,
    pub device_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub diagnostic_id: Option<String>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusDataPayload {
    pub device_id: String,
    pub diagnostic_id: Option<String>,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub status_data: Vec<StatusReading>,
    pub count: usize,
}

pub fn normalize_status_data(
    device_id: &str,
    diagnostic_id: Option<&str>,
    readings: &[StatusData],
    window: TimeWindow,
) -> StatusDataPayload {
    let mut ordered: Vec<&StatusData> = readings.iter().collect();
    ordered.sort_by(|a, b| a.date_time.cmp(&b.date_time).then_with(|| a.id.cmp(&b.id)));

    let status_data: Vec<StatusReading> = ordered
        .into_iter()
        .map(|reading| StatusReading {
            id: reading.id.clone(),
            device_id: entity_id(reading.device.as_ref()).or_else(|| Some(device_id.to_string())),
            timestamp: reading.date_time,
            diagnostic_id: entity_id(reading.diagnostic.as_ref()),
            value: reading.data,
        })
        .collect();

    StatusDataPayload {
        device_id: device_id.to_string(),
        diagnostic_id: diagnostic_id.map(str::to_string),
        from_date: window.from,
        to_date: window.to,
        count: status_data.len(),
        status_data,
    }
}
