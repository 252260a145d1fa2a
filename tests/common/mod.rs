//! Common test utilities for end-to-end tests
//!
//! This module provides shared infrastructure for testing the MCP server:
//! - In-memory and mock-HTTP Geotab backends
//! - Server lifecycle management
//! - A protocol-aware HTTP client

#![allow(dead_code)]

pub mod constants;
mod fixtures;
mod mock_geotab;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::FakeBackend;
#[allow(unused_imports)]
pub use mock_geotab::MockGeotab;
#[allow(unused_imports)]
pub use server::TestServer;

use geotab_mcp_server::config::GeotabSettings;

/// Settings pointing the real client at a mock account
pub fn mock_settings(mock: &MockGeotab) -> GeotabSettings {
    GeotabSettings {
        username: MOCK_USERNAME.to_string(),
        password: MOCK_PASSWORD.to_string(),
        database: MOCK_DATABASE.to_string(),
        server: mock.base_url.clone(),
    }
}
