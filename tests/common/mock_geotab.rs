//! Mock MyGeotab JSON-RPC server
//!
//! Serves `POST /apiv1` on a random port. It understands just enough of
//! `Authenticate`, `Get` and `GetAddresses` to exercise the real client,
//! and records every call it receives.

use super::constants::*;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Default)]
pub struct MockGeotabState {
    device_ids: Vec<String>,
    valid_session: Mutex<Option<String>>,
    sessions_issued: AtomicUsize,
    calls: Mutex<Vec<Value>>,
    reject_login: AtomicBool,
    fail_geocoding: AtomicBool,
    http_status: Mutex<Option<StatusCode>>,
}

/// A running mock account. Shut down when dropped.
pub struct MockGeotab {
    pub base_url: String,
    state: Arc<MockGeotabState>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockGeotab {
    /// Account holding the three fixture vehicles
    pub async fn start() -> Self {
        Self::with_device_ids(
            [DEVICE_1_ID, DEVICE_2_ID, RETIRED_DEVICE_ID]
                .iter()
                .map(|id| id.to_string())
                .collect(),
        )
        .await
    }

    /// Account holding `count` vehicles, enough to force paging
    pub async fn with_devices(count: usize) -> Self {
        Self::with_device_ids((0..count).map(|i| format!("b{:05}", i)).collect()).await
    }

    async fn with_device_ids(mut device_ids: Vec<String>) -> Self {
        device_ids.sort();
        let state = Arc::new(MockGeotabState {
            device_ids,
            ..Default::default()
        });

        let app = Router::new()
            .route("/apiv1", post(handle_rpc))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock Geotab");
        let port = listener.local_addr().unwrap().port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Mock Geotab failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Methods received so far, in order
    pub fn methods(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| c["method"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Full request bodies received so far
    pub fn calls(&self) -> Vec<Value> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn sessions_issued(&self) -> usize {
        self.state.sessions_issued.load(Ordering::SeqCst)
    }

    /// Invalidate the current session, as an expiry on the server would
    pub fn expire_session(&self) {
        *self.state.valid_session.lock().unwrap() = None;
    }

    pub fn reject_login(&self, reject: bool) {
        self.state.reject_login.store(reject, Ordering::SeqCst);
    }

    pub fn fail_geocoding(&self, fail: bool) {
        self.state.fail_geocoding.store(fail, Ordering::SeqCst);
    }

    /// Answer every request with a bare HTTP status
    pub fn respond_with_status(&self, status: Option<StatusCode>) {
        *self.state.http_status.lock().unwrap() = status;
    }
}

impl Drop for MockGeotab {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn rpc_result(result: Value) -> Json<Value> {
    Json(json!({ "result": result, "jsonrpc": "2.0" }))
}

fn rpc_error(exception: &str, message: &str) -> Json<Value> {
    Json(json!({
        "error": {
            "message": message,
            "code": -32000,
            "data": { "type": exception },
            "name": "JSONRPCError",
        },
        "jsonrpc": "2.0",
    }))
}

async fn handle_rpc(
    State(state): State<Arc<MockGeotabState>>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    state.calls.lock().unwrap().push(body.clone());

    if let Some(status) = *state.http_status.lock().unwrap() {
        return status.into_response();
    }

    let params = &body["params"];
    match body["method"].as_str().unwrap_or_default() {
        "Authenticate" => authenticate(&state, params).into_response(),
        method => {
            let session = params["credentials"]["sessionId"].as_str();
            let valid = state.valid_session.lock().unwrap().clone();
            if session.is_none() || session.map(str::to_string) != valid {
                return rpc_error(
                    "InvalidUserException",
                    "Incorrect login credentials @ 'acme_fleet'",
                )
                .into_response();
            }
            match method {
                "Get" => get(&state, params).into_response(),
                "GetAddresses" => get_addresses(&state, params).into_response(),
                other => rpc_error("MissingMethodException", &format!("Unknown method {}", other))
                    .into_response(),
            }
        }
    }
}

fn authenticate(state: &MockGeotabState, params: &Value) -> Json<Value> {
    let accepted = !state.reject_login.load(Ordering::SeqCst)
        && params["userName"] == MOCK_USERNAME
        && params["password"] == MOCK_PASSWORD
        && params["database"] == MOCK_DATABASE;
    if !accepted {
        return rpc_error("InvalidUserException", "Incorrect login credentials");
    }

    let n = state.sessions_issued.fetch_add(1, Ordering::SeqCst) + 1;
    let session_id = format!("session-{}", n);
    *state.valid_session.lock().unwrap() = Some(session_id.clone());

    rpc_result(json!({
        "credentials": {
            "database": MOCK_DATABASE,
            "sessionId": session_id,
            "userName": MOCK_USERNAME,
        },
        "path": "ThisServer",
    }))
}

fn device_json(id: &str) -> Value {
    let retired = id == RETIRED_DEVICE_ID;
    json!({
        "id": id,
        "name": format!("Vehicle {}", id),
        "serialNumber": format!("G9{}", id.to_uppercase()),
        "deviceType": "GO9",
        "productId": 120,
        "groups": [{"id": "GroupCompanyId"}],
        "activeFrom": "2020-01-01T00:00:00.000Z",
        "activeTo": if retired { "2021-01-01T00:00:00.000Z" } else { "2050-01-01T00:00:00.000Z" },
        "workTime": "WorkTimeStandardHoursId",
    })
}

fn get(state: &MockGeotabState, params: &Value) -> Json<Value> {
    let search = &params["search"];
    let device_id = search["deviceSearch"]["id"].as_str();
    let has_device = |id: Option<&str>| id.is_some_and(|id| state.device_ids.iter().any(|d| d == id));

    match params["typeName"].as_str().unwrap_or_default() {
        "Device" => match search["id"].as_str() {
            Some(id) => {
                let found: Vec<Value> = has_device(Some(id))
                    .then(|| device_json(id))
                    .into_iter()
                    .collect();
                rpc_result(json!(found))
            }
            None => {
                let limit = params["resultsLimit"].as_u64().unwrap_or(u64::MAX) as usize;
                let offset = params["sort"]["offset"].as_str();
                let page: Vec<Value> = state
                    .device_ids
                    .iter()
                    .filter(|id| offset.map_or(true, |o| id.as_str() > o))
                    .take(limit)
                    .map(|id| device_json(id))
                    .collect();
                rpc_result(json!(page))
            }
        },
        "DeviceStatusInfo" if device_id == Some(DEVICE_1_ID) => rpc_result(json!([{
            "device": {"id": DEVICE_1_ID},
            "dateTime": "2024-05-10T11:58:00.000Z",
            "latitude": DEVICE_1_LATITUDE,
            "longitude": DEVICE_1_LONGITUDE,
            "speed": 42.5,
            "bearing": 90,
            "isDriving": true,
            "isDeviceCommunicating": true,
        }])),
        "DeviceStatusInfo" => rpc_result(json!([])),
        "Trip" if device_id == Some(DEVICE_1_ID) => rpc_result(json!([
            {
                "id": "t1",
                "device": {"id": DEVICE_1_ID},
                "start": "2024-05-09T08:00:00.000Z",
                "stop": "2024-05-09T08:30:00.000Z",
                "distance": 12.5,
                "drivingDuration": "00:30:00",
                "stopPoint": {"x": DEVICE_1_LONGITUDE, "y": DEVICE_1_LATITUDE},
            },
            {
                "id": "t2",
                "device": {"id": DEVICE_1_ID},
                "start": "2024-05-09T12:00:00.000Z",
                "stop": "2024-05-09T12:45:00.000Z",
                "distance": 20.0,
                "drivingDuration": "00:45:00",
                "stopPoint": {"x": 0, "y": 0},
            },
        ])),
        "FaultData" if device_id == Some(DEVICE_1_ID) => rpc_result(json!([{
            "id": "f1",
            "dateTime": "2024-05-08T10:00:00.000Z",
            "device": {"id": DEVICE_1_ID},
            "diagnostic": {"id": "DiagnosticEngineLightOnId"},
            "controller": "ControllerNoneId",
            "faultState": "Active",
            "count": 2,
        }])),
        "StatusData" if device_id == Some(DEVICE_1_ID) => rpc_result(json!([{
            "id": "s1",
            "dateTime": "2024-05-10T11:30:00.000Z",
            "device": {"id": DEVICE_1_ID},
            "diagnostic": {"id": COOLANT_DIAGNOSTIC_ID},
            "data": 88.5,
        }])),
        "Trip" | "FaultData" | "StatusData" => rpc_result(json!([])),
        other => rpc_error("ArgumentException", &format!("Unknown type {}", other)),
    }
}

fn get_addresses(state: &MockGeotabState, params: &Value) -> Json<Value> {
    if state.fail_geocoding.load(Ordering::SeqCst) {
        return rpc_error("GeocoderException", "Geocoder backend timed out");
    }

    let addresses: Vec<Value> = params["coordinates"]
        .as_array()
        .map(|points| {
            points
                .iter()
                .map(|p| {
                    if p["y"] == json!(DEVICE_1_LATITUDE) && p["x"] == json!(DEVICE_1_LONGITUDE) {
                        json!({ "formattedAddress": DEVICE_1_ADDRESS })
                    } else {
                        json!({ "formattedAddress": "" })
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    rpc_result(json!(addresses))
}
