//! # Error Handling Framework
//!
//! Shared error handling for the RDS Operations Dashboard backend: the
//! HTTP-facing error taxonomy, remediation guidance for AWS-style failures,
//! structured logging, sanitization, retry backoff and circuit breaking.
//!
//! ## Features
//!
//! - Error kinds mapped to HTTP status codes
//! - Remediation blocks for access denied, region opt-in, missing permission and throttling failures
//! - Structured logging with correlation IDs
//! - Error sanitization to prevent information leakage
//! - Retry mechanisms with exponential backoff
//! - Per-service circuit breakers

pub mod types;
pub mod logging;
pub mod sanitization;
pub mod remediation;
pub mod retry;
pub mod circuit_breaker;

// Re-export commonly used types
pub use types::{Error, ErrorKind, Result};
pub use logging::{
    current_correlation_id, init_logging, log_classified_error, log_handler_error,
    set_correlation_id, with_correlation_id, LoggingConfig,
};
pub use remediation::{AwsFailure, Remediation};
pub use retry::{RetryConfig, RetryOutcome, RetryPolicy};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitHealth, CircuitState};
pub use sanitization::{sanitize_context, sanitize_message};

/// Initializes the error handling framework with default settings
pub fn init() -> Result<()> {
    init_logging(None)
}

/// Initializes the error handling framework from a configuration source
pub fn init_with_config(config: config::Config) -> Result<()> {
    let log_config = LoggingConfig::try_from(config).ok();
    init_logging(log_config)
}
