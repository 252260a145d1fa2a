//! Protocol Dispatcher
//!
//! One linear pass per request: decode, classify, then either answer from
//! the registry (discover) or validate and run an operation (execute). Every
//! failure is turned into a failure envelope here; nothing escapes to the
//! transport.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, error, field, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::context::OperationContext;
use super::protocol::{
    DiscoverResponse, EnvelopeHeader, McpError, McpRequest, McpResponse, ResultEnvelope,
};
use super::registry::OperationRegistry;
use crate::geotab::GeotabBackend;

/// Message of the error reported when a handler outlives the backend timeout
pub const BACKEND_TIMEOUT_MESSAGE: &str = "Geotab did not respond in time";

pub struct Dispatcher {
    registry: Arc<OperationRegistry>,
    backend: Arc<dyn GeotabBackend>,
    backend_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(registry: Arc<OperationRegistry>, backend: Arc<dyn GeotabBackend>) -> Self {
        Self {
            registry,
            backend,
            backend_timeout: None,
        }
    }

    /// Bound every handler invocation; `None` waits indefinitely.
    pub fn with_backend_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.backend_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Handle a raw request body, evaluated at the current instant.
    pub async fn handle(&self, body: &[u8]) -> McpResponse {
        self.handle_at(body, Utc::now()).await
    }

    /// Handle a raw request body, evaluated at `as_of`.
    pub async fn handle_at(&self, body: &[u8], as_of: DateTime<Utc>) -> McpResponse {
        let span = info_span!(
            "mcp_request",
            request_id = %Uuid::new_v4(),
            message_type = field::Empty,
            operation = field::Empty,
        );

        async move {
            let value: Value = match serde_json::from_slice(body) {
                Ok(value) => value,
                Err(e) => {
                    debug!("Rejecting undecodable body: {}", e);
                    return ResultEnvelope::failure(
                        EnvelopeHeader::default(),
                        McpError::malformed("body is not valid JSON"),
                    )
                    .into();
                }
            };
            self.handle_value(&value, as_of).await
        }
        .instrument(span)
        .await
    }

    /// Handle an already decoded request.
    pub async fn handle_value(&self, value: &Value, as_of: DateTime<Utc>) -> McpResponse {
        let request = match McpRequest::parse(value) {
            Ok(request) => request,
            Err(e) => {
                info!("{}", e);
                return ResultEnvelope::failure(EnvelopeHeader::from_value(value), e).into();
            }
        };

        let span = tracing::Span::current();
        span.record("message_type", request.message_type());
        debug!("Client speaks protocol version {}", request.version());

        match request {
            McpRequest::Discover { .. } => {
                let operations = self
                    .registry
                    .list_operations()
                    .into_iter()
                    .cloned()
                    .collect();
                DiscoverResponse::new(operations).into()
            }
            McpRequest::Execute {
                operation,
                parameters,
                ..
            } => {
                span.record("operation", operation.as_str());
                self.execute(&operation, &parameters, as_of).await.into()
            }
        }
    }

    async fn execute(
        &self,
        name: &str,
        parameters: &Map<String, Value>,
        as_of: DateTime<Utc>,
    ) -> ResultEnvelope {
        let header = EnvelopeHeader::execute(name);

        let operation = match self.registry.get_operation(name) {
            Ok(operation) => operation,
            Err(e) => {
                info!("{}", e);
                let error = McpError::UnknownOperation {
                    name: name.to_string(),
                    available: self.registry.operation_names(),
                };
                return ResultEnvelope::failure(header, error);
            }
        };

        let params = match operation.descriptor.validate(parameters, as_of) {
            Ok(params) => params,
            Err(violations) => {
                let error = McpError::InvalidParameters(violations);
                info!("{}", error);
                return ResultEnvelope::failure(header, error);
            }
        };

        let ctx = OperationContext::new(Arc::clone(&self.backend), as_of);
        let call = (operation.handler)(ctx, params);
        let outcome = match self.backend_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("{} timed out after {:?}", operation.name(), limit);
                    Err(McpError::BackendUnavailable(
                        BACKEND_TIMEOUT_MESSAGE.to_string(),
                    ))
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(result) => {
                info!("{} succeeded", operation.name());
                ResultEnvelope::success(name, result)
            }
            Err(e) => {
                match &e {
                    McpError::InternalError(_) => error!("{} failed: {}", operation.name(), e),
                    McpError::BackendAuthFailure | McpError::BackendUnavailable(_) => {
                        warn!("{} failed: {}", operation.name(), e)
                    }
                    _ => info!("{} failed: {}", operation.name(), e),
                }
                ResultEnvelope::failure(header, e)
            }
        }
    }
}
