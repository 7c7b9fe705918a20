//! # Standardized Error Types
//!
//! Outer error taxonomy of the dashboard backend. Every handler failure is
//! mapped onto one [`ErrorKind`], which fixes the HTTP status code returned
//! to the caller.

use std::error::Error as StdError;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::remediation::Remediation;

/// A type alias for Result with the error type defaulting to our Error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Categorizes different kinds of errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed or missing input
    Validation,
    /// Referenced entity does not exist
    NotFound,
    /// Caller lacks the permissions for the operation
    Forbidden,
    /// Operation conflicts with the current state
    Conflict,
    /// Caller or upstream is being throttled
    Throttling,
    /// Unhandled failure
    Internal,
    /// Upstream did not answer in time
    Timeout,
}

impl ErrorKind {
    /// HTTP status code returned for this kind
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Throttling => 429,
            ErrorKind::Internal => 500,
            ErrorKind::Timeout => 504,
        }
    }

    /// Name used in the `error` field of JSON error bodies
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Forbidden => "InsufficientPermissions",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Throttling => "Throttling",
            ErrorKind::Internal => "InternalError",
            ErrorKind::Timeout => "Timeout",
        }
    }

    /// Maps an HTTP status back to a kind; unknown statuses are internal errors
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::Validation,
            401 | 403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            429 => ErrorKind::Throttling,
            504 => ErrorKind::Timeout,
            _ => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Core error type of the handler layer
///
/// `Clone` is implemented manually: clones drop the opaque `cause`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Error {
    /// A unique identifier for this error instance
    pub id: Uuid,
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Detailed error message
    pub message: String,
    /// The time when the error occurred
    pub timestamp: DateTime<Utc>,
    /// Correlation ID (the Lambda request id) for request tracing
    pub correlation_id: Option<String>,
    /// Error code for categorization and documentation
    pub code: Option<String>,
    /// Remediation guidance for recognized AWS-style failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<Remediation>,
    /// Additional context as key-value pairs
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
    /// Chain of causes (not serialized)
    #[serde(skip)]
    pub cause: Option<Box<dyn StdError + Send + Sync>>,
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            kind: self.kind,
            message: self.message.clone(),
            timestamp: self.timestamp,
            correlation_id: self.correlation_id.clone(),
            code: self.code.clone(),
            remediation: self.remediation.clone(),
            context: self.context.clone(),
            cause: None,
        }
    }
}

impl Error {
    /// Creates a new error with the specified kind and message
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            correlation_id: crate::logging::current_correlation_id(),
            code: None,
            remediation: None,
            context: serde_json::Map::new(),
            cause: None,
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Sets the error code
    pub fn code<S: Into<String>>(mut self, code: S) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Adds context information to the error
    pub fn context<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Serialize,
    {
        if let Ok(value) = serde_json::to_value(value) {
            self.context.insert(key.into(), value);
        }
        self
    }

    /// Chains this error with its cause
    pub fn cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Attaches remediation guidance when the message or code names a recognized AWS failure
    pub fn with_detected_remediation(mut self) -> Self {
        if self.remediation.is_none() {
            let probe = match &self.code {
                Some(code) => format!("{} {}", code, self.message),
                None => self.message.clone(),
            };
            self.remediation = crate::remediation::detect(&probe);
        }
        self
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    /// JSON body of an error response: `{error, message[, remediation]}`
    pub fn to_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": self.kind.name(),
            "message": crate::sanitization::sanitize_message(&self.message),
        });
        if let Some(code) = &self.code {
            body["code"] = serde_json::Value::String(code.clone());
        }
        if let Some(correlation_id) = &self.correlation_id {
            body["request_id"] = serde_json::Value::String(correlation_id.clone());
        }
        if let Some(remediation) = &self.remediation {
            if let Ok(value) = serde_json::to_value(remediation) {
                body["remediation"] = value;
            }
        }
        body
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;

        if let Some(code) = &self.code {
            write!(f, " (Code: {})", code)?;
        }

        if let Some(correlation_id) = &self.correlation_id {
            write!(f, " [CorrelationID: {}]", correlation_id)?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_ref().map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Validation, format!("JSON error: {}", err)).cause(err)
    }
}

impl From<shared_types::StoreError> for Error {
    fn from(err: shared_types::StoreError) -> Self {
        let kind = match &err {
            shared_types::StoreError::TableNotFound(_) | shared_types::StoreError::ObjectNotFound(_) => {
                ErrorKind::NotFound
            }
            shared_types::StoreError::Unavailable(_) | shared_types::StoreError::Serialization(_) => {
                ErrorKind::Internal
            }
        };
        Self::new(kind, err.to_string()).cause(err)
    }
}

impl From<shared_types::ParseEnumError> for Error {
    fn from(err: shared_types::ParseEnumError) -> Self {
        Self::new(ErrorKind::Validation, err.to_string()).cause(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::new(ErrorKind::Validation, "Invalid input format")
            .code("VAL-001")
            .context("field", "operation");

        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.message, "Invalid input format");
        assert_eq!(err.code, Some("VAL-001".to_string()));
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.context["field"], "operation");
    }

    #[test]
    fn test_status_code_taxonomy() {
        assert_eq!(ErrorKind::Validation.status_code(), 400);
        assert_eq!(ErrorKind::Forbidden.status_code(), 403);
        assert_eq!(ErrorKind::NotFound.status_code(), 404);
        assert_eq!(ErrorKind::Conflict.status_code(), 409);
        assert_eq!(ErrorKind::Throttling.status_code(), 429);
        assert_eq!(ErrorKind::Internal.status_code(), 500);
        assert_eq!(ErrorKind::Timeout.status_code(), 504);
        assert_eq!(ErrorKind::from_status(418), ErrorKind::Internal);
    }

    #[test]
    fn test_error_display() {
        let err = Error::not_found("Alert not found").code("ALERT-404");
        let display = format!("{}", err);
        assert!(display.contains("NotFound"));
        assert!(display.contains("Alert not found"));
        assert!(display.contains("Code: ALERT-404"));
    }

    #[test]
    fn test_body_contains_remediation_for_access_denied() {
        let err = Error::new(ErrorKind::Forbidden, "AccessDenied: not authorized to perform rds:DescribeDBInstances")
            .with_detected_remediation();
        let body = err.to_body();

        assert_eq!(body["error"], "InsufficientPermissions");
        assert!(body["remediation"]["steps"].as_array().map(|s| !s.is_empty()).unwrap_or(false));
    }

    #[test]
    fn test_body_without_remediation() {
        let body = Error::validation("Missing field: operation").to_body();
        assert_eq!(body["error"], "ValidationError");
        assert!(body.get("remediation").is_none());
    }

    #[test]
    fn test_clone_drops_cause() {
        let err = Error::internal("boom").cause(std::io::Error::new(std::io::ErrorKind::Other, "io"));
        assert!(err.source().is_some());
        assert!(err.clone().source().is_none());
    }
}
