//! MCP HTTP Handler
//!
//! Binds `POST /mcp` to the dispatcher. The body is taken as raw bytes so a
//! body that is not JSON still gets a protocol envelope back.

use std::sync::Arc;
use std::time::Duration;

use axum::{body::Bytes, extract::State, Json};
use tracing::info;

use super::dispatcher::Dispatcher;
use super::protocol::McpResponse;
use super::registry::{OperationRegistry, RegistryError};
use crate::geotab::GeotabBackend;
use crate::server::state::GuardedDispatcher;

/// Protocol endpoint. Always answers 200; the envelope carries the outcome.
pub async fn mcp_handler(
    State(dispatcher): State<GuardedDispatcher>,
    body: Bytes,
) -> Json<McpResponse> {
    Json(dispatcher.handle(&body).await)
}

/// Build the dispatcher for the Geotab catalog
pub fn create_dispatcher(
    backend: Arc<dyn GeotabBackend>,
    backend_timeout: Option<Duration>,
) -> Result<Dispatcher, RegistryError> {
    let registry = OperationRegistry::geotab()?;

    info!(
        "MCP registry initialized with {} operations",
        registry.operation_count()
    );

    Ok(Dispatcher::new(Arc::new(registry), backend).with_backend_timeout(backend_timeout))
}
