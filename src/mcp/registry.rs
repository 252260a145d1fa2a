//! Operation Registry
//!
//! Static catalog mapping operation name to parameter schema and handler.
//! Built once at startup and read-only afterwards; it is the single source
//! of truth for discover responses.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::context::OperationContext;
use super::protocol::{McpError, ParameterViolation};

// ============================================================================
// Parameter Schema
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Enum,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Enum => "enum",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            ParameterType::String | ParameterType::Enum => value.is_string(),
            ParameterType::Number => value.is_number(),
            ParameterType::Boolean => value.is_boolean(),
        }
    }
}

/// Extra shape constraint on a string parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParameterFormat {
    /// RFC 3339 timestamp
    #[serde(rename = "date-time")]
    DateTime,
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Declaration of one operation parameter.
///
/// Required parameters carry no default; a default always matches the
/// declared type. [`OperationRegistry::register`] enforces both.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    pub description: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ParameterFormat>,
    /// Date-time values must not lie after the instant the request is evaluated at
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub past_only: bool,
}

impl ParameterSpec {
    fn new(name: &str, param_type: ParameterType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: false,
            default: None,
            allowed_values: Vec::new(),
            exclusive_minimum: None,
            format: None,
            past_only: false,
        }
    }

    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, ParameterType::String, description)
    }

    pub fn number(name: &str, description: &str) -> Self {
        Self::new(name, ParameterType::Number, description)
    }

    pub fn boolean(name: &str, description: &str) -> Self {
        Self::new(name, ParameterType::Boolean, description)
    }

    pub fn enumeration(name: &str, description: &str, values: &[&str]) -> Self {
        let mut spec = Self::new(name, ParameterType::Enum, description);
        spec.allowed_values = values.iter().map(|v| v.to_string()).collect();
        spec
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn exclusive_minimum(mut self, minimum: f64) -> Self {
        self.exclusive_minimum = Some(minimum);
        self
    }

    pub fn date_time(mut self) -> Self {
        self.format = Some(ParameterFormat::DateTime);
        self
    }

    pub fn not_in_future(mut self) -> Self {
        self.past_only = true;
        self
    }

    /// Check a supplied value, returning the effective value on success.
    ///
    /// `None` and JSON `null` both mean "not supplied". `as_of` bounds
    /// parameters declared with [`ParameterSpec::not_in_future`].
    pub fn check(
        &self,
        value: Option<&Value>,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Value>, String> {
        let value = match value {
            None | Some(Value::Null) if self.required => {
                return Err("required parameter is missing".to_string())
            }
            None | Some(Value::Null) => return Ok(self.default.clone()),
            Some(value) => value,
        };

        if !self.param_type.matches(value) {
            return Err(format!(
                "expected {}, got {}",
                self.param_type.as_str(),
                json_type_name(value)
            ));
        }

        self.check_constraints(value)?;

        if self.past_only {
            let instant = value
                .as_str()
                .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
                .map(|instant| instant.with_timezone(&Utc));
            if instant.is_some_and(|instant| instant > as_of) {
                return Err("must not be in the future".to_string());
            }
        }

        Ok(Some(value.clone()))
    }

    fn check_constraints(&self, value: &Value) -> Result<(), String> {
        if self.param_type == ParameterType::Enum {
            let accepted = value
                .as_str()
                .is_some_and(|v| self.allowed_values.iter().any(|allowed| allowed == v));
            if !accepted {
                return Err(format!(
                    "must be one of: {}",
                    self.allowed_values.join(", ")
                ));
            }
        }

        if let (Some(minimum), Some(number)) = (self.exclusive_minimum, value.as_f64()) {
            if number <= minimum {
                return Err(format!("must be greater than {}", minimum));
            }
        }

        if let (Some(ParameterFormat::DateTime), Some(text)) = (self.format, value.as_str()) {
            if DateTime::parse_from_rfc3339(text).is_err() {
                return Err("expected an RFC 3339 timestamp".to_string());
            }
        }

        Ok(())
    }

    /// The reason this declaration is unusable, if any.
    fn declaration_error(&self) -> Option<String> {
        if self.name.is_empty() {
            return Some("parameter name is empty".to_string());
        }
        if self.param_type == ParameterType::Enum && self.allowed_values.is_empty() {
            return Some("enum parameter declares no values".to_string());
        }
        if self.past_only && self.format != Some(ParameterFormat::DateTime) {
            return Some("only date-time parameters can be bounded by the request instant".to_string());
        }
        let default = self.default.as_ref()?;
        if self.required {
            return Some("required parameter declares a default".to_string());
        }
        if !self.param_type.matches(default) {
            return Some(format!(
                "default is not a {}",
                self.param_type.as_str()
            ));
        }
        self.check_constraints(default)
            .err()
            .map(|reason| format!("default {}", reason))
    }
}

// ============================================================================
// Operation Descriptor
// ============================================================================

/// Public description of an operation, as returned by discover
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OperationDescriptor {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub parameters: Vec<ParameterSpec>,
    pub returns: String,
}

impl OperationDescriptor {
    /// Validate supplied parameters against this descriptor.
    ///
    /// Declared parameters are checked in declaration order, then undeclared
    /// ones in name order. Every violation is collected before failing.
    pub fn validate(
        &self,
        supplied: &Map<String, Value>,
        as_of: DateTime<Utc>,
    ) -> Result<ValidatedParameters, Vec<ParameterViolation>> {
        let mut values = Map::new();
        let mut violations = Vec::new();

        for spec in &self.parameters {
            match spec.check(supplied.get(&spec.name), as_of) {
                Ok(Some(value)) => {
                    values.insert(spec.name.clone(), value);
                }
                Ok(None) => {}
                Err(reason) => violations.push(ParameterViolation::new(&spec.name, reason)),
            }
        }

        let mut unknown: Vec<&String> = supplied
            .keys()
            .filter(|name| !self.parameters.iter().any(|spec| &spec.name == *name))
            .collect();
        unknown.sort();
        violations.extend(
            unknown
                .into_iter()
                .map(|name| ParameterViolation::new(name, "unknown parameter")),
        );

        if violations.is_empty() {
            Ok(ValidatedParameters { values })
        } else {
            Err(violations)
        }
    }
}

/// Parameters that passed validation, with defaults filled in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedParameters {
    values: Map<String, Value>,
}

impl ValidatedParameters {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    /// A parameter the schema declares as required.
    pub fn required_str(&self, name: &str) -> Result<&str, McpError> {
        self.str(name)
            .ok_or_else(|| McpError::InternalError(format!("validated parameter {} is absent", name)))
    }

    /// A parameter the schema gives a numeric default.
    pub fn required_f64(&self, name: &str) -> Result<f64, McpError> {
        self.f64(name)
            .ok_or_else(|| McpError::InternalError(format!("validated parameter {} is absent", name)))
    }
}

impl From<Map<String, Value>> for ValidatedParameters {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Result type for operation execution
pub type OperationResult = Result<Value, McpError>;

/// Boxed future for async operation execution
pub type OperationFuture = Pin<Box<dyn Future<Output = OperationResult> + Send>>;

/// Operation handler function type
pub type OperationHandler =
    Arc<dyn Fn(OperationContext, ValidatedParameters) -> OperationFuture + Send + Sync>;

/// An operation with its descriptor and handler
pub struct RegisteredOperation {
    pub descriptor: OperationDescriptor,
    pub handler: OperationHandler,
}

impl RegisteredOperation {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Builder for registering an operation
pub struct OperationBuilder {
    name: String,
    description: String,
    aliases: Vec<String>,
    parameters: Vec<ParameterSpec>,
    returns: String,
}

impl OperationBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            aliases: Vec::new(),
            parameters: Vec::new(),
            returns: String::new(),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn returns(mut self, returns: impl Into<String>) -> Self {
        self.returns = returns.into();
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> RegisteredOperation
    where
        F: Fn(OperationContext, ValidatedParameters) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        RegisteredOperation {
            descriptor: OperationDescriptor {
                name: self.name,
                description: self.description,
                aliases: self.aliases,
                parameters: self.parameters,
                returns: self.returns,
            },
            handler: Arc::new(move |ctx, params| Box::pin(handler(ctx, params))),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Operation not found: {0}")]
    NotFound(String),

    #[error("Operation name already registered: {0}")]
    DuplicateName(String),

    #[error("Invalid parameter {parameter} of operation {operation}: {reason}")]
    InvalidParameter {
        operation: String,
        parameter: String,
        reason: String,
    },

    #[error("Invalid operation declaration {0}: {1}")]
    InvalidOperation(String, String),
}

/// Ordered catalog of operations, looked up by name or alias
pub struct OperationRegistry {
    operations: Vec<RegisteredOperation>,
    index: HashMap<String, usize>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register an operation, rejecting name clashes and bad declarations.
    pub fn register(&mut self, operation: RegisteredOperation) -> Result<(), RegistryError> {
        let descriptor = &operation.descriptor;
        if descriptor.name.is_empty() {
            return Err(RegistryError::InvalidOperation(
                String::new(),
                "name is empty".to_string(),
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for spec in &descriptor.parameters {
            if let Some(reason) = spec.declaration_error() {
                return Err(RegistryError::InvalidParameter {
                    operation: descriptor.name.clone(),
                    parameter: spec.name.clone(),
                    reason,
                });
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(RegistryError::InvalidParameter {
                    operation: descriptor.name.clone(),
                    parameter: spec.name.clone(),
                    reason: "declared twice".to_string(),
                });
            }
        }

        let names: Vec<String> = std::iter::once(&descriptor.name)
            .chain(descriptor.aliases.iter())
            .cloned()
            .collect();
        for (i, name) in names.iter().enumerate() {
            if self.index.contains_key(name) || names[..i].contains(name) {
                return Err(RegistryError::DuplicateName(name.clone()));
            }
        }

        let position = self.operations.len();
        for name in names {
            self.index.insert(name, position);
        }
        self.operations.push(operation);
        Ok(())
    }

    /// Descriptors in registration order
    pub fn list_operations(&self) -> Vec<&OperationDescriptor> {
        self.operations.iter().map(|op| &op.descriptor).collect()
    }

    /// Look up an operation by its canonical name or one of its aliases
    pub fn get_operation(&self, name: &str) -> Result<&RegisteredOperation, RegistryError> {
        self.index
            .get(name)
            .and_then(|&position| self.operations.get(position))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Canonical names in registration order
    pub fn operation_names(&self) -> Vec<String> {
        self.operations
            .iter()
            .map(|op| op.descriptor.name.clone())
            .collect()
    }

    /// Get the number of registered operations
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
