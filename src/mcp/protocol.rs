//! MCP Protocol Types
//!
//! Envelopes of the discover/execute protocol. Every request is a JSON object
//! carrying `type` and `version`; execute requests additionally name an
//! `operation` and its `parameters`.

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::registry::OperationDescriptor;
use crate::geotab::BackendError;

/// Protocol version spoken by this server
pub const MCP_VERSION: &str = "0.1.0";

// ============================================================================
// Message Types
// ============================================================================

pub mod message_types {
    pub const DISCOVER: &str = "discover";
    pub const EXECUTE: &str = "execute";

    /// Used in failure envelopes when the request type could not be read
    pub const ERROR: &str = "error";
}

// ============================================================================
// Requests
// ============================================================================

/// A structurally valid inbound request
#[derive(Debug, Clone, PartialEq)]
pub enum McpRequest {
    Discover {
        version: String,
    },
    Execute {
        version: String,
        operation: String,
        parameters: Map<String, Value>,
    },
}

impl McpRequest {
    /// Validate the envelope structure of a decoded request body.
    pub fn parse(value: &Value) -> Result<Self, McpError> {
        let object = value
            .as_object()
            .ok_or_else(|| McpError::malformed("request must be a JSON object"))?;

        let message_type = match object.get("type") {
            Some(Value::String(message_type)) => message_type.as_str(),
            Some(_) => return Err(McpError::malformed("`type` must be a string")),
            None => return Err(McpError::malformed("missing `type`")),
        };

        let version = match object.get("version") {
            Some(Value::String(version)) => version.clone(),
            Some(_) => return Err(McpError::malformed("`version` must be a string")),
            None => return Err(McpError::malformed("missing `version`")),
        };

        match message_type {
            message_types::DISCOVER => Ok(McpRequest::Discover { version }),
            message_types::EXECUTE => {
                let operation = match object.get("operation") {
                    Some(Value::String(operation)) if !operation.is_empty() => operation.clone(),
                    Some(Value::String(_)) => {
                        return Err(McpError::malformed("`operation` must not be empty"))
                    }
                    Some(_) => return Err(McpError::malformed("`operation` must be a string")),
                    None => {
                        return Err(McpError::malformed(
                            "missing `operation` for execute request",
                        ))
                    }
                };

                let parameters = match object.get("parameters") {
                    None | Some(Value::Null) => Map::new(),
                    Some(Value::Object(parameters)) => parameters.clone(),
                    Some(_) => return Err(McpError::malformed("`parameters` must be an object")),
                };

                Ok(McpRequest::Execute {
                    version,
                    operation,
                    parameters,
                })
            }
            other => Err(McpError::malformed(format!(
                "unrecognized message type: {}",
                other
            ))),
        }
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            McpRequest::Discover { .. } => message_types::DISCOVER,
            McpRequest::Execute { .. } => message_types::EXECUTE,
        }
    }

    pub fn version(&self) -> &str {
        match self {
            McpRequest::Discover { version } => version,
            McpRequest::Execute { version, .. } => version,
        }
    }
}

/// The parts of a request echoed back in a failure envelope.
///
/// Read leniently so that even a malformed request gets a useful echo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub message_type: Option<&'static str>,
    pub operation: Option<String>,
}

impl EnvelopeHeader {
    pub fn from_value(value: &Value) -> Self {
        let message_type = match value.get("type").and_then(Value::as_str) {
            Some(message_types::DISCOVER) => Some(message_types::DISCOVER),
            Some(message_types::EXECUTE) => Some(message_types::EXECUTE),
            _ => None,
        };
        let operation = value
            .get("operation")
            .and_then(Value::as_str)
            .filter(|operation| !operation.is_empty())
            .map(str::to_string);

        Self {
            message_type,
            operation,
        }
    }

    pub fn execute(operation: impl Into<String>) -> Self {
        Self {
            message_type: Some(message_types::EXECUTE),
            operation: Some(operation.into()),
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Response to a discover request
#[derive(Debug, Clone, Serialize)]
pub struct DiscoverResponse {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub version: &'static str,
    pub operations: Vec<OperationDescriptor>,
}

impl DiscoverResponse {
    pub fn new(operations: Vec<OperationDescriptor>) -> Self {
        Self {
            message_type: message_types::DISCOVER,
            version: MCP_VERSION,
            operations,
        }
    }
}

/// Outcome of an execute request. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ResultEnvelope {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ResultEnvelope {
    pub fn success(operation: impl Into<String>, result: Value) -> Self {
        Self {
            message_type: message_types::EXECUTE,
            version: MCP_VERSION,
            operation: Some(operation.into()),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(header: EnvelopeHeader, error: McpError) -> Self {
        Self {
            message_type: header.message_type.unwrap_or(message_types::ERROR),
            version: MCP_VERSION,
            operation: header.operation,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Any response the dispatcher can produce
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum McpResponse {
    Discover(DiscoverResponse),
    Result(ResultEnvelope),
}

impl From<DiscoverResponse> for McpResponse {
    fn from(response: DiscoverResponse) -> Self {
        McpResponse::Discover(response)
    }
}

impl From<ResultEnvelope> for McpResponse {
    fn from(envelope: ResultEnvelope) -> Self {
        McpResponse::Result(envelope)
    }
}

/// Error object of a failure envelope
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

// ============================================================================
// Errors
// ============================================================================

/// One offending parameter of an execute request
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ParameterViolation {
    pub parameter: String,
    pub reason: String,
}

impl ParameterViolation {
    pub fn new(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}

/// Protocol error taxonomy
#[derive(Debug, Clone, PartialEq)]
pub enum McpError {
    MalformedRequest(String),
    UnknownOperation {
        name: String,
        available: Vec<String>,
    },
    InvalidParameters(Vec<ParameterViolation>),
    BackendAuthFailure,
    BackendUnavailable(String),
    NotFound(String),
    InternalError(String),
}

impl McpError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        McpError::MalformedRequest(reason.into())
    }

    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        McpError::InvalidParameters(vec![ParameterViolation::new(parameter, reason)])
    }

    pub fn code(&self) -> &'static str {
        match self {
            McpError::MalformedRequest(_) => "MalformedRequest",
            McpError::UnknownOperation { .. } => "UnknownOperation",
            McpError::InvalidParameters(_) => "InvalidParameters",
            McpError::BackendAuthFailure => "BackendAuthFailure",
            McpError::BackendUnavailable(_) => "BackendUnavailable",
            McpError::NotFound(_) => "NotFound",
            McpError::InternalError(_) => "InternalError",
        }
    }

    pub fn message(&self) -> String {
        match self {
            McpError::MalformedRequest(reason) => format!("Malformed request: {}", reason),
            McpError::UnknownOperation { name, .. } => format!("Unknown operation: {}", name),
            McpError::InvalidParameters(violations) => {
                let listed: Vec<String> = violations
                    .iter()
                    .map(|v| format!("{} ({})", v.parameter, v.reason))
                    .collect();
                format!("Invalid parameters: {}", listed.join("; "))
            }
            McpError::BackendAuthFailure => {
                "Geotab rejected the configured credentials".to_string()
            }
            McpError::BackendUnavailable(reason) => reason.clone(),
            McpError::NotFound(what) => what.clone(),
            McpError::InternalError(msg) => format!("Internal error: {}", msg),
        }
    }

    /// Whether a caller may retry the same request later
    pub fn is_transient(&self) -> bool {
        matches!(self, McpError::BackendUnavailable(_))
    }
}

impl std::fmt::Display for McpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl From<McpError> for ErrorBody {
    fn from(err: McpError) -> Self {
        let details = match &err {
            McpError::InvalidParameters(violations) => Some(json!({ "violations": violations })),
            McpError::UnknownOperation { available, .. } => {
                Some(json!({ "available_operations": available }))
            }
            _ => None,
        };

        ErrorBody {
            code: err.code().to_string(),
            message: err.message(),
            details,
        }
    }
}

impl From<BackendError> for McpError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(_) => McpError::BackendUnavailable(err.to_string()),
            BackendError::AuthFailure => McpError::BackendAuthFailure,
            BackendError::NotFound(what) => McpError::NotFound(what),
        }
    }
}
