//! Geotab Operations
//!
//! The fixed catalog exposed over discover/execute. Each operation binds a
//! descriptor to a handler that calls the adapter once and normalizes the
//! records it gets back.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use super::context::OperationContext;
use super::normalize::{
    normalize_devices, normalize_faults, normalize_location, normalize_status_data,
    normalize_trips,
};
use super::protocol::McpError;
use super::registry::{
    OperationBuilder, OperationRegistry, OperationResult, ParameterSpec, RegisteredOperation,
    RegistryError, ValidatedParameters,
};
use crate::geotab::TimeWindow;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;
const MILLIS_PER_DAY: f64 = 24.0 * MILLIS_PER_HOUR;

impl OperationRegistry {
    /// The Geotab catalog, in the order discover reports it.
    pub fn geotab() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        register_operations(&mut registry)?;
        Ok(registry)
    }
}

/// Register the Geotab operations with the registry
pub fn register_operations(registry: &mut OperationRegistry) -> Result<(), RegistryError> {
    registry.register(get_devices_operation())?;
    registry.register(get_device_location_operation())?;
    registry.register(get_trips_operation())?;
    registry.register(get_fault_data_operation())?;
    registry.register(get_status_data_operation())?;
    Ok(())
}

fn to_payload<T: Serialize>(payload: &T) -> OperationResult {
    serde_json::to_value(payload).map_err(|e| McpError::InternalError(e.to_string()))
}

fn device_id_parameter(purpose: &str) -> ParameterSpec {
    ParameterSpec::string("device_id", &format!("ID of the device to get {} for", purpose))
        .required()
}

/// The window of `amount` units ending at `as_of`.
fn lookback_window(
    as_of: DateTime<Utc>,
    parameter: &str,
    amount: f64,
    millis_per_unit: f64,
) -> Result<TimeWindow, McpError> {
    let millis = amount * millis_per_unit;
    let from = (millis.is_finite() && millis < i64::MAX as f64)
        .then(|| Duration::try_milliseconds(millis as i64))
        .flatten()
        .and_then(|span| as_of.checked_sub_signed(span))
        .ok_or_else(|| McpError::invalid_parameter(parameter, "is too large"))?;

    Ok(TimeWindow::new(from, as_of))
}

// ============================================================================
// get_devices
// ============================================================================

fn get_devices_operation() -> RegisteredOperation {
    OperationBuilder::new("get_devices")
        .alias("get_device_info")
        .description("Get information about all devices in the Geotab account")
        .parameter(
            ParameterSpec::boolean(
                "include_inactive",
                "Whether to include inactive devices in the results",
            )
            .default_value(false),
        )
        .returns("List of devices with their details")
        .build(get_devices_handler)
}

async fn get_devices_handler(ctx: OperationContext, params: ValidatedParameters) -> OperationResult {
    let include_inactive = params.bool("include_inactive").unwrap_or(false);

    let devices = ctx.backend.list_devices().await?;
    debug!(
        "Normalizing {} devices (include_inactive={})",
        devices.len(),
        include_inactive
    );

    to_payload(&normalize_devices(&devices, include_inactive, ctx.as_of))
}

// ============================================================================
// get_device_location
// ============================================================================

fn get_device_location_operation() -> RegisteredOperation {
    OperationBuilder::new("get_device_location")
        .description("Get the current location of a specific device")
        .parameter(device_id_parameter("the location"))
        .returns("Current location with coordinates, speed and resolved address")
        .build(get_device_location_handler)
}

async fn get_device_location_handler(
    ctx: OperationContext,
    params: ValidatedParameters,
) -> OperationResult {
    let device_id = params.required_str("device_id")?;

    let location = ctx.backend.get_location(device_id).await?;
    to_payload(&normalize_location(&location))
}

// ============================================================================
// get_trips
// ============================================================================

fn get_trips_operation() -> RegisteredOperation {
    OperationBuilder::new("get_trips")
        .alias("get_trip_data")
        .description("Get trip data for a specific device within a time range")
        .parameter(device_id_parameter("trip data"))
        .parameter(
            ParameterSpec::number("days", "Number of days to look back from current time")
                .default_value(1)
                .exclusive_minimum(0.0),
        )
        .parameter(
            ParameterSpec::string(
                "since",
                "Start of the time range as an RFC 3339 timestamp; overrides days",
            )
            .date_time()
            .not_in_future(),
        )
        .parameter(
            ParameterSpec::boolean(
                "include_stops",
                "Whether to include the stops between trips",
            )
            .default_value(false),
        )
        .returns("List of trips with start and end times, locations, distance and duration")
        .build(get_trips_handler)
}

fn trips_window(params: &ValidatedParameters, as_of: DateTime<Utc>) -> Result<TimeWindow, McpError> {
    match params.str("since") {
        Some(since) => {
            let from = DateTime::parse_from_rfc3339(since)
                .map_err(|_| McpError::invalid_parameter("since", "expected an RFC 3339 timestamp"))?
                .with_timezone(&Utc);
            Ok(TimeWindow::new(from.min(as_of), as_of))
        }
        None => lookback_window(as_of, "days", params.required_f64("days")?, MILLIS_PER_DAY),
    }
}

async fn get_trips_handler(ctx: OperationContext, params: ValidatedParameters) -> OperationResult {
    let device_id = params.required_str("device_id")?;
    let include_stops = params.bool("include_stops").unwrap_or(false);
    let window = trips_window(&params, ctx.as_of)?;

    let records = ctx.backend.list_trips(device_id, window).await?;
    to_payload(&normalize_trips(device_id, &records, window, include_stops))
}

// ============================================================================
// get_fault_data
// ============================================================================

fn get_fault_data_operation() -> RegisteredOperation {
    OperationBuilder::new("get_fault_data")
        .description("Get fault codes and diagnostic data for a device")
        .parameter(device_id_parameter("fault data"))
        .parameter(
            ParameterSpec::number("days", "Number of days to look back from current time")
                .default_value(7)
                .exclusive_minimum(0.0),
        )
        .parameter(
            ParameterSpec::boolean("active_only", "Whether to include only active faults")
                .default_value(true),
        )
        .returns("List of diagnostic trouble codes with diagnostic, controller and state")
        .build(get_fault_data_handler)
}

async fn get_fault_data_handler(
    ctx: OperationContext,
    params: ValidatedParameters,
) -> OperationResult {
    let device_id = params.required_str("device_id")?;
    let active_only = params.bool("active_only").unwrap_or(true);
    let window = lookback_window(ctx.as_of, "days", params.required_f64("days")?, MILLIS_PER_DAY)?;

    let faults = ctx.backend.list_faults(device_id, window).await?;
    to_payload(&normalize_faults(device_id, &faults, window, active_only))
}

// ============================================================================
// get_status_data
// ============================================================================

fn get_status_data_operation() -> RegisteredOperation {
    OperationBuilder::new("get_status_data")
        .description("Get raw engine and sensor readings for a device")
        .parameter(device_id_parameter("status data"))
        .parameter(ParameterSpec::string(
            "diagnostic_id",
            "Only return readings of this diagnostic (e.g. DiagnosticEngineSpeedId)",
        ))
        .parameter(
            ParameterSpec::number("hours", "Number of hours to look back from current time")
                .default_value(1)
                .exclusive_minimum(0.0),
        )
        .returns("List of status readings with timestamp, diagnostic and value")
        .build(get_status_data_handler)
}

async fn get_status_data_handler(
    ctx: OperationContext,
    params: ValidatedParameters,
) -> OperationResult {
    let device_id = params.required_str("device_id")?;
    let diagnostic_id = params.str("diagnostic_id");
    let window = lookback_window(
        ctx.as_of,
        "hours",
        params.required_f64("hours")?,
        MILLIS_PER_HOUR,
    )?;

    let readings = ctx
        .backend
        .list_status_data(device_id, diagnostic_id, window)
        .await?;
    to_payload(&normalize_status_data(
        device_id,
        diagnostic_id,
        &readings,
        window,
    ))
}
