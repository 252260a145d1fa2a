//! MCP (Model Context Protocol) Server
//!
//! Exposes a fixed catalog of read-only Geotab queries through a
//! discover/execute protocol, so an LLM agent can enumerate the operations
//! and call them without knowing the Geotab API.
//!
//! ## Architecture
//!
//! - Transport: JSON over HTTP `POST /mcp`
//! - Registry: operation descriptors bound to handlers, built at startup
//! - Dispatcher: envelope validation, parameter checks, error mapping
//! - Normalizer: pure conversion of Geotab records into result payloads

pub mod context;
pub mod dispatcher;
pub mod handler;
pub mod normalize;
pub mod operations;
pub mod protocol;
pub mod registry;

pub use dispatcher::Dispatcher;
pub use handler::{create_dispatcher, mcp_handler};
pub use protocol::{McpError, McpRequest, McpResponse, MCP_VERSION};
pub use registry::OperationRegistry;
