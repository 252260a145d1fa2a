//! JSON-RPC client for the MyGeotab API.

use std::sync::RwLock;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::models::{
    Coordinate, Credentials, Device, DeviceLocation, DeviceStatusInfo, FaultData,
    JsonRpcResponse, LoginResult, ReverseGeocodeAddress, StatusData, TimeWindow, Trip,
    TripRecord,
};
use super::{BackendError, GeotabBackend};
use crate::config::GeotabSettings;

const API_PATH: &str = "apiv1";
const THIS_SERVER: &str = "ThisServer";
const DEVICE_PAGE_SIZE: usize = 1000;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
struct Session {
    credentials: Credentials,
    endpoint: String,
}

/// Shared MyGeotab client.
///
/// One instance is built at startup and shared by every request. The session
/// lives behind a lock; it is only replaced on (re-)authentication.
pub struct GeotabClient {
    client: reqwest::Client,
    settings: GeotabSettings,
    session: RwLock<Option<Session>>,
}

impl GeotabClient {
    pub fn new(settings: GeotabSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("geotab-mcp-server/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            settings,
            session: RwLock::new(None),
        })
    }

    /// The `apiv1` endpoint used for authentication.
    pub fn endpoint(&self) -> String {
        api_endpoint(&self.settings.server)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_session().is_some()
    }

    /// Open a session with the configured credentials.
    ///
    /// Called once at startup so bad credentials stop the process before it
    /// starts serving, and again lazily after a session was invalidated.
    pub async fn authenticate(&self) -> Result<(), BackendError> {
        let endpoint = self.endpoint();
        info!(
            "Authenticating to {} with database {}",
            endpoint, self.settings.database
        );

        let params = json!({
            "database": self.settings.database,
            "userName": self.settings.username,
            "password": self.settings.password,
        });
        let login: LoginResult = self.post(&endpoint, "Authenticate", params).await?;

        // The database may live on another server of the federation
        let endpoint = match login.path.as_deref() {
            Some(path) if !path.is_empty() && path != THIS_SERVER => api_endpoint(path),
            _ => endpoint,
        };

        info!(
            "Authenticated to Geotab as {} (endpoint {})",
            login.credentials.user_name, endpoint
        );
        self.store_session(Some(Session {
            credentials: login.credentials,
            endpoint,
        }));
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store_session(&self, session: Option<Session>) {
        *self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    async fn session(&self) -> Result<Session, BackendError> {
        if let Some(session) = self.current_session() {
            return Ok(session);
        }
        self.authenticate().await?;
        self.current_session().ok_or(BackendError::AuthFailure)
    }

    /// Call an authenticated API method.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        mut params: Value,
    ) -> Result<T, BackendError> {
        let session = self.session().await?;

        if let Value::Object(map) = &mut params {
            let credentials = serde_json::to_value(&session.credentials)
                .map_err(|_| BackendError::unavailable("could not encode the request"))?;
            map.insert("credentials".to_string(), credentials);
        }

        match self.post(&session.endpoint, method, params).await {
            Err(BackendError::AuthFailure) => {
                // Expired or revoked session: drop it so the next request logs in again
                self.store_session(None);
                Err(BackendError::AuthFailure)
            }
            other => other,
        }
    }

    async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
    ) -> Result<T, BackendError> {
        debug!("Geotab call {} -> {}", method, endpoint);

        let body = json!({ "method": method, "params": params });
        let response = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Geotab {} request failed: {}", method, e);
                if e.is_timeout() {
                    BackendError::unavailable("request timed out")
                } else {
                    BackendError::unavailable("could not reach the API")
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!("Geotab {} rejected with status {}", method, status);
            return Err(BackendError::AuthFailure);
        }
        if !status.is_success() {
            warn!("Geotab {} failed with status {}", method, status);
            return Err(BackendError::unavailable("unexpected HTTP status"));
        }

        let envelope: JsonRpcResponse<T> = response.json().await.map_err(|e| {
            warn!("Failed to parse Geotab {} response: {}", method, e);
            BackendError::unavailable("unreadable response")
        })?;

        if let Some(error) = envelope.error {
            warn!(
                "Geotab {} returned error [{}]: {}",
                method,
                error.exception_names().join(", "),
                error.message.as_deref().unwrap_or("no message")
            );
            if error.is_invalid_user() {
                return Err(BackendError::AuthFailure);
            }
            return Err(BackendError::unavailable("the API reported an error"));
        }

        envelope.result.ok_or_else(|| {
            warn!("Geotab {} response carried no result", method);
            BackendError::unavailable("empty response")
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        type_name: &str,
        search: Value,
    ) -> Result<Vec<T>, BackendError> {
        self.call("Get", json!({ "typeName": type_name, "search": search }))
            .await
    }

    async fn ensure_device(&self, device_id: &str) -> Result<(), BackendError> {
        let devices: Vec<Value> = self.get("Device", json!({ "id": device_id })).await?;
        if devices.is_empty() {
            debug!("Device {} does not exist", device_id);
            return Err(BackendError::device_not_found(device_id));
        }
        Ok(())
    }

    /// Reverse geocode a batch of points with one `GetAddresses` call.
    ///
    /// Returns one entry per input point. A failed lookup yields no addresses
    /// instead of failing the surrounding operation.
    async fn resolve_addresses(&self, coordinates: &[Coordinate]) -> Vec<Option<String>> {
        if coordinates.is_empty() {
            return Vec::new();
        }

        let params = json!({ "coordinates": coordinates, "movingAddresses": false });
        match self
            .call::<Vec<ReverseGeocodeAddress>>("GetAddresses", params)
            .await
        {
            Ok(addresses) => {
                let mut resolved: Vec<Option<String>> = addresses
                    .into_iter()
                    .map(|a| a.formatted_address.filter(|s| !s.is_empty()))
                    .collect();
                resolved.resize(coordinates.len(), None);
                resolved
            }
            Err(e) => {
                warn!("Reverse geocoding failed, continuing without addresses: {}", e);
                vec![None; coordinates.len()]
            }
        }
    }

    fn device_search(device_id: &str, window: TimeWindow) -> Value {
        json!({
            "deviceSearch": { "id": device_id },
            "fromDate": window.from,
            "toDate": window.to,
        })
    }
}

#[async_trait]
impl GeotabBackend for GeotabClient {
    async fn list_devices(&self) -> Result<Vec<Device>, BackendError> {
        let mut devices: Vec<Device> = Vec::new();
        let mut last_id: Option<String> = None;

        loop {
            let sort = match &last_id {
                Some(id) => json!({
                    "sortBy": "id",
                    "sortDirection": "asc",
                    "offset": id,
                    "lastId": id,
                }),
                None => json!({ "sortBy": "id", "sortDirection": "asc" }),
            };
            let params = json!({
                "typeName": "Device",
                "resultsLimit": DEVICE_PAGE_SIZE,
                "sort": sort,
            });
            let page: Vec<Device> = self.call("Get", params).await?;

            let page_len = page.len();
            let page_last_id = page.last().map(|d| d.id.clone());
            devices.extend(page);

            // A short page is the last one; a repeated cursor means the server ignored it
            if page_len < DEVICE_PAGE_SIZE || page_last_id.is_none() || page_last_id == last_id {
                break;
            }
            last_id = page_last_id;
        }

        info!("Retrieved {} devices", devices.len());
        Ok(devices)
    }

    async fn get_location(&self, device_id: &str) -> Result<DeviceLocation, BackendError> {
        debug!("Fetching location for device {}", device_id);

        let statuses: Vec<DeviceStatusInfo> = self
            .get("DeviceStatusInfo", json!({ "deviceSearch": { "id": device_id } }))
            .await?;

        let status = statuses.into_iter().next().ok_or_else(|| {
            BackendError::NotFound(format!("No location available for device: {}", device_id))
        })?;

        let address = match status.coordinate().filter(Coordinate::is_known) {
            Some(point) => self.resolve_addresses(&[point]).await.pop().flatten(),
            None => None,
        };

        Ok(DeviceLocation {
            device_id: device_id.to_string(),
            status,
            address,
        })
    }

    async fn list_trips(
        &self,
        device_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<TripRecord>, BackendError> {
        self.ensure_device(device_id).await?;

        debug!(
            "Fetching trips for device {} from {} to {}",
            device_id, window.from, window.to
        );
        let trips: Vec<Trip> = self
            .get("Trip", Self::device_search(device_id, window))
            .await?;

        let mut records: Vec<TripRecord> = trips.into_iter().map(TripRecord::from).collect();

        let located: Vec<(usize, Coordinate)> = records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.trip.stop_point.filter(Coordinate::is_known).map(|p| (i, p)))
            .collect();
        let points: Vec<Coordinate> = located.iter().map(|(_, p)| *p).collect();
        let addresses = self.resolve_addresses(&points).await;
        for ((index, _), address) in located.into_iter().zip(addresses) {
            if let Some(record) = records.get_mut(index) {
                record.stop_address = address;
            }
        }

        info!("Retrieved {} trips for device {}", records.len(), device_id);
        Ok(records)
    }

    async fn list_faults(
        &self,
        device_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<FaultData>, BackendError> {
        self.ensure_device(device_id).await?;

        let faults: Vec<FaultData> = self
            .get("FaultData", Self::device_search(device_id, window))
            .await?;

        info!("Retrieved {} faults for device {}", faults.len(), device_id);
        Ok(faults)
    }

    async fn list_status_data(
        &self,
        device_id: &str,
        diagnostic_id: Option<&str>,
        window: TimeWindow,
    ) -> Result<Vec<StatusData>, BackendError> {
        self.ensure_device(device_id).await?;

        let mut search = Self::device_search(device_id, window);
        if let (Some(diagnostic_id), Value::Object(map)) = (diagnostic_id, &mut search) {
            map.insert(
                "diagnosticSearch".to_string(),
                json!({ "id": diagnostic_id }),
            );
        }

        let readings: Vec<StatusData> = self.get("StatusData", search).await?;

        info!(
            "Retrieved {} status readings for device {}",
            readings.len(),
            device_id
        );
        Ok(readings)
    }
}

/// Build the JSON-RPC endpoint for a server name or base URL.
fn api_endpoint(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    if server.starts_with("http://") || server.starts_with("https://") {
        format!("{}/{}", server, API_PATH)
    } else {
        format!("https://{}/{}", server, API_PATH)
    }
}
