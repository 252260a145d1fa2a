//! Geotab backend adapter.
//!
//! Everything that talks to MyGeotab lives behind [`GeotabBackend`]: session
//! handling, endpoint addressing, paging and reverse geocoding. The adapter
//! translates and never retries; retry policy belongs to its callers.

pub mod client;
pub mod models;

use async_trait::async_trait;
use thiserror::Error;

pub use client::GeotabClient;
pub use models::{
    Coordinate, Device, DeviceLocation, DeviceStatusInfo, EntityRef, FaultData, StatusData,
    TimeWindow, Trip, TripRecord,
};

/// Failures the adapter can report.
///
/// Messages are fixed phrases safe to show to a caller. Raw transport and
/// JSON-RPC error text is logged where it happens and never stored here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Geotab is unavailable: {0}")]
    Unavailable(String),

    #[error("Geotab rejected the configured credentials")]
    AuthFailure,

    #[error("{0}")]
    NotFound(String),
}

impl BackendError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        BackendError::Unavailable(reason.into())
    }

    pub fn device_not_found(device_id: &str) -> Self {
        BackendError::NotFound(format!("Device not found: {}", device_id))
    }
}

/// Capability-specific read access to a Geotab account.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait GeotabBackend: Send + Sync {
    /// All devices in the account.
    async fn list_devices(&self) -> Result<Vec<Device>, BackendError>;

    /// Latest position of a device, with its address resolved when possible.
    async fn get_location(&self, device_id: &str) -> Result<DeviceLocation, BackendError>;

    /// Trips recorded for a device inside `window`.
    async fn list_trips(
        &self,
        device_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<TripRecord>, BackendError>;

    /// Fault codes recorded for a device inside `window`.
    async fn list_faults(
        &self,
        device_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<FaultData>, BackendError>;

    /// Raw status readings for a device, optionally restricted to one diagnostic.
    async fn list_status_data(
        &self,
        device_id: &str,
        diagnostic_id: Option<&str>,
        window: TimeWindow,
    ) -> Result<Vec<StatusData>, BackendError>;
}
