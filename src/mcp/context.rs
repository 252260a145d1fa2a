//! Operation Execution Context

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::geotab::GeotabBackend;

/// Context provided to operation handlers during execution
#[derive(Clone)]
pub struct OperationContext {
    /// Shared Geotab adapter
    pub backend: Arc<dyn GeotabBackend>,

    /// Instant the request is evaluated at. Handlers never read the clock
    /// themselves, so identical requests over identical data match.
    pub as_of: DateTime<Utc>,
}

impl OperationContext {
    pub fn new(backend: Arc<dyn GeotabBackend>, as_of: DateTime<Utc>) -> Self {
        Self { backend, as_of }
    }
}
