//! Shared constants for end-to-end tests
//!
//! When fixture data changes (device ids, addresses, etc.), update only
//! this file.

// ============================================================================
// Server Lifecycle
// ============================================================================

/// How long to wait for a spawned server to answer `GET /`
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Delay between readiness probes
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// Timeout applied to every request of the test client
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Protocol
// ============================================================================

pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Canonical operation names in catalog order
pub const OPERATIONS: [&str; 5] = [
    "get_devices",
    "get_device_location",
    "get_trips",
    "get_fault_data",
    "get_status_data",
];

// ============================================================================
// Fixture Fleet
// ============================================================================

/// Active vehicle with a location, trips, faults and status data
pub const DEVICE_1_ID: &str = "b1";

/// Active vehicle that never reported a position
pub const DEVICE_2_ID: &str = "b2";

/// Vehicle retired before the test run
pub const RETIRED_DEVICE_ID: &str = "b3";

/// Id no device in the account has
pub const UNKNOWN_DEVICE_ID: &str = "b404";

pub const DEVICE_1_LATITUDE: f64 = 43.6532;
pub const DEVICE_1_LONGITUDE: f64 = -79.3832;
pub const DEVICE_1_ADDRESS: &str = "100 Queen St W, Toronto, ON";

pub const COOLANT_DIAGNOSTIC_ID: &str = "DiagnosticEngineCoolantTemperatureId";
pub const ENGINE_SPEED_DIAGNOSTIC_ID: &str = "DiagnosticEngineSpeedId";

// ============================================================================
// Mock Geotab API
// ============================================================================

pub const MOCK_USERNAME: &str = "fleet@example.com";
pub const MOCK_PASSWORD: &str = "correct-horse";
pub const MOCK_DATABASE: &str = "acme_fleet";
