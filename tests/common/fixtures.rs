//! In-memory Geotab backend for end-to-end tests
//!
//! Records are written in Geotab's wire format and decoded with the same
//! models the real client uses, relative to a reference instant so that
//! lookback windows behave the same on every run.

use super::constants::*;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use geotab_mcp_server::geotab::{
    BackendError, Device, DeviceLocation, DeviceStatusInfo, FaultData, GeotabBackend,
    StatusData, TimeWindow, Trip, TripRecord,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

fn decode<T: DeserializeOwned>(value: Value) -> T {
    serde_json::from_value(value).expect("fixture does not match the Geotab model")
}

/// Canned account served from memory.
///
/// Trips are returned regardless of the requested window, like Geotab does
/// for trips overlapping it; faults and readings are filtered by timestamp.
pub struct FakeBackend {
    pub now: DateTime<Utc>,
    devices: Vec<Device>,
    locations: HashMap<String, DeviceLocation>,
    trips: HashMap<String, Vec<TripRecord>>,
    faults: HashMap<String, Vec<FaultData>>,
    status_data: HashMap<String, Vec<StatusData>>,
    failure: Option<BackendError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    windows: Mutex<Vec<TimeWindow>>,
}

impl FakeBackend {
    /// Account with no devices at all.
    pub fn empty() -> Self {
        Self {
            now: Utc::now(),
            devices: Vec::new(),
            locations: HashMap::new(),
            trips: HashMap::new(),
            faults: HashMap::new(),
            status_data: HashMap::new(),
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
            windows: Mutex::new(Vec::new()),
        }
    }

    /// Three vehicles, one of them retired, with history around `Utc::now()`.
    pub fn fleet() -> Self {
        let now = Utc::now();
        let at = |offset: ChronoDuration| (now - offset).to_rfc3339();

        let devices = vec![
            decode(json!({
                "id": DEVICE_1_ID,
                "name": "Truck 1",
                "serialNumber": "G9A0000001",
                "deviceType": "GO9",
                "productId": 120,
                "groups": [{"id": "GroupCompanyId"}, {"id": "b27A5"}],
                "activeFrom": "2020-01-01T00:00:00Z",
                "activeTo": "2050-01-01T00:00:00Z",
            })),
            decode(json!({
                "id": DEVICE_2_ID,
                "name": "Van 2",
                "serialNumber": "G9A0000002",
                "deviceType": "GO9",
                "groups": ["GroupCompanyId"],
                "activeFrom": "2021-06-01T00:00:00Z",
                "activeTo": "2050-01-01T00:00:00Z",
            })),
            decode(json!({
                "id": RETIRED_DEVICE_ID,
                "name": "Old Truck",
                "serialNumber": "G7A0000003",
                "deviceType": "GO7",
                "activeFrom": "2015-01-01T00:00:00Z",
                "activeTo": "2019-12-31T00:00:00Z",
            })),
        ];

        let status: DeviceStatusInfo = decode(json!({
            "device": {"id": DEVICE_1_ID},
            "dateTime": at(ChronoDuration::minutes(2)),
            "latitude": DEVICE_1_LATITUDE,
            "longitude": DEVICE_1_LONGITUDE,
            "speed": 42.5,
            "bearing": 90,
            "isDriving": true,
            "isDeviceCommunicating": true,
        }));
        let mut locations = HashMap::new();
        locations.insert(
            DEVICE_1_ID.to_string(),
            DeviceLocation {
                device_id: DEVICE_1_ID.to_string(),
                status,
                address: Some(DEVICE_1_ADDRESS.to_string()),
            },
        );

        let trip = |id: &str, hours_ago: i64, km: f64| -> TripRecord {
            let start = now - ChronoDuration::hours(hours_ago);
            let stop = start + ChronoDuration::minutes(30);
            let trip: Trip = decode(json!({
                "id": id,
                "device": {"id": DEVICE_1_ID},
                "start": start.to_rfc3339(),
                "stop": stop.to_rfc3339(),
                "distance": km,
                "drivingDuration": "00:30:00",
                "idlingDuration": "00:02:30",
                "stopDuration": "02:00:00",
                "nextTripStart": (stop + ChronoDuration::hours(2)).to_rfc3339(),
                "maximumSpeed": 88.0,
                "averageSpeed": km * 2.0,
                "stopPoint": {"x": DEVICE_1_LONGITUDE, "y": DEVICE_1_LATITUDE},
            }));
            TripRecord {
                trip,
                stop_address: Some(DEVICE_1_ADDRESS.to_string()),
            }
        };
        let mut trips = HashMap::new();
        trips.insert(
            DEVICE_1_ID.to_string(),
            vec![
                trip("t4", 240, 50.0),
                trip("t1", 20, 12.5),
                trip("t3", 144, 30.0),
                trip("t2", 72, 20.0),
            ],
        );

        let fault = |id: &str, days_ago: i64, state: &str| -> FaultData {
            decode(json!({
                "id": id,
                "dateTime": at(ChronoDuration::days(days_ago)),
                "device": {"id": DEVICE_1_ID},
                "diagnostic": {"id": "DiagnosticEngineLightOnId", "name": "Engine light on"},
                "controller": "ControllerNoneId",
                "failureMode": "NoFailureModeId",
                "faultState": state,
                "count": 1,
                "malfunctionLamp": true,
            }))
        };
        let mut faults = HashMap::new();
        faults.insert(
            DEVICE_1_ID.to_string(),
            vec![
                fault("f1", 2, "Active"),
                fault("f2", 4, "Inactive"),
                fault("f3", 20, "Active"),
            ],
        );

        let reading = |id: &str, minutes_ago: i64, diagnostic: &str, value: f64| -> StatusData {
            decode(json!({
                "id": id,
                "dateTime": at(ChronoDuration::minutes(minutes_ago)),
                "device": {"id": DEVICE_1_ID},
                "diagnostic": {"id": diagnostic},
                "data": value,
            }))
        };
        let mut status_data = HashMap::new();
        status_data.insert(
            DEVICE_1_ID.to_string(),
            vec![
                reading("s2", 10, COOLANT_DIAGNOSTIC_ID, 91.0),
                reading("s1", 30, COOLANT_DIAGNOSTIC_ID, 88.5),
                reading("s3", 20, ENGINE_SPEED_DIAGNOSTIC_ID, 1800.0),
                reading("s0", 180, COOLANT_DIAGNOSTIC_ID, 20.0),
            ],
        );

        Self {
            now,
            devices,
            locations,
            trips,
            faults,
            status_data,
            ..Self::empty()
        }
    }

    /// Every call fails with `error`.
    pub fn failing_with(mut self, error: BackendError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Every call sleeps for `delay` before answering.
    pub fn delayed_by(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times any backend method was invoked.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Windows passed to the historical queries, in call order.
    pub fn requested_windows(&self) -> Vec<TimeWindow> {
        self.windows.lock().unwrap().clone()
    }

    async fn enter(&self, window: Option<TimeWindow>) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(window) = window {
            self.windows.lock().unwrap().push(window);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn ensure_device(&self, device_id: &str) -> Result<(), BackendError> {
        if self.devices.iter().any(|d| d.id == device_id) {
            Ok(())
        } else {
            Err(BackendError::device_not_found(device_id))
        }
    }
}

fn in_window(instant: Option<DateTime<Utc>>, window: &TimeWindow) -> bool {
    instant.is_some_and(|t| window.contains(t))
}

#[async_trait]
impl GeotabBackend for FakeBackend {
    async fn list_devices(&self) -> Result<Vec<Device>, BackendError> {
        self.enter(None).await?;
        Ok(self.devices.clone())
    }

    async fn get_location(&self, device_id: &str) -> Result<DeviceLocation, BackendError> {
        self.enter(None).await?;
        self.ensure_device(device_id)?;
        self.locations.get(device_id).cloned().ok_or_else(|| {
            BackendError::NotFound(format!("No location available for device: {}", device_id))
        })
    }

    async fn list_trips(
        &self,
        device_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<TripRecord>, BackendError> {
        self.enter(Some(window)).await?;
        self.ensure_device(device_id)?;
        Ok(self.trips.get(device_id).cloned().unwrap_or_default())
    }

    async fn list_faults(
        &self,
        device_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<FaultData>, BackendError> {
        self.enter(Some(window)).await?;
        self.ensure_device(device_id)?;
        Ok(self
            .faults
            .get(device_id)
            .map(|faults| {
                faults
                    .iter()
                    .filter(|f| in_window(f.date_time, &window))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_status_data(
        &self,
        device_id: &str,
        diagnostic_id: Option<&str>,
        window: TimeWindow,
    ) -> Result<Vec<StatusData>, BackendError> {
        self.enter(Some(window)).await?;
        self.ensure_device(device_id)?;
        Ok(self
            .status_data
            .get(device_id)
            .map(|readings| {
                readings
                    .iter()
                    .filter(|r| in_window(r.date_time, &window))
                    .filter(|r| match diagnostic_id {
                        Some(id) => r.diagnostic.as_ref().is_some_and(|d| d.id == id),
                        None => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
