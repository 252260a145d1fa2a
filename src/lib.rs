//! Geotab MCP Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod geotab;
pub mod mcp;
pub mod server;

// Re-export commonly used types for convenience
pub use geotab::{BackendError, GeotabBackend, GeotabClient};
pub use mcp::{Dispatcher, OperationRegistry};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};
