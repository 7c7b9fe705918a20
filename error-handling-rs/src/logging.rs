//! # Structured Logging
//!
//! Structured logging with correlation ID tracking. In Lambda the correlation
//! ID is the invocation's request id.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use uuid::Uuid;

use shared_types::{ClassifiedError, Severity};

use crate::types::{Error, ErrorKind, Result};

thread_local! {
    static CORRELATION_ID: RefCell<Option<String>> = RefCell::new(None);
}

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// The log level to use (trace, debug, info, warn, error)
    pub level: String,
    /// The service name for identification
    pub service_name: String,
    /// Whether to output logs to a file
    pub file_output: bool,
    /// The directory to store log files in
    pub log_dir: Option<String>,
    /// Whether to use JSON formatting
    pub json_format: bool,
    /// Custom fields to add to every log
    pub custom_fields: HashMap<String, serde_json::Value>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "rds-operations-dashboard".to_string(),
            file_output: false,
            log_dir: None,
            json_format: true,
            custom_fields: HashMap::new(),
        }
    }
}

/// Initializes the structured logging system. Later calls are no-ops.
pub fn init_logging(config: Option<LoggingConfig>) -> Result<()> {
    if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let config = config.unwrap_or_default();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let file_layer = match (config.file_output, config.log_dir.as_ref()) {
        (true, Some(log_dir)) => {
            let file_appender = RollingFileAppender::new(
                tracing_appender::rolling::Rotation::DAILY,
                log_dir,
                format!("{}.log", config.service_name),
            );
            let (non_blocking, guard) = NonBlocking::new(file_appender);
            // Keep the guard alive for the lifetime of the program
            Box::leak(Box::new(guard));
            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        _ => None,
    };

    // JSON and text layers have distinct types, so each branch installs its own subscriber.
    let installed = if config.json_format {
        let json_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true);
        let subscriber = Registry::default().with(filter).with(file_layer).with(json_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let text_layer = fmt::layer().with_target(true);
        let subscriber = Registry::default().with(filter).with(file_layer).with(text_layer);
        tracing::subscriber::set_global_default(subscriber)
    };

    installed.map_err(|e| {
        Error::new(ErrorKind::Internal, format!("Failed to set global subscriber: {}", e))
    })?;

    LOGGING_INITIALIZED.store(true, Ordering::SeqCst);

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = %config.json_format,
        custom_fields = ?config.custom_fields,
        "Structured logging initialized"
    );

    Ok(())
}

/// Sets the correlation ID for the current thread
pub fn set_correlation_id<S: Into<String>>(correlation_id: S) {
    CORRELATION_ID.with(|id| {
        *id.borrow_mut() = Some(correlation_id.into());
    });
}

/// Generates and sets a new correlation ID
pub fn generate_correlation_id() -> String {
    let id = Uuid::new_v4().to_string();
    set_correlation_id(id.clone());
    id
}

/// Retrieves the current correlation ID
pub fn current_correlation_id() -> Option<String> {
    CORRELATION_ID.with(|id| id.borrow().clone())
}

/// Clears the correlation ID for the current thread
pub fn clear_correlation_id() {
    CORRELATION_ID.with(|id| {
        *id.borrow_mut() = None;
    });
}

/// Executes a function with a specific correlation ID, restoring the previous one afterwards
pub fn with_correlation_id<F, R, S>(correlation_id: S, f: F) -> R
where
    F: FnOnce() -> R,
    S: Into<String>,
{
    let previous = current_correlation_id();
    set_correlation_id(correlation_id);

    let result = f();

    match previous {
        Some(id) => set_correlation_id(id),
        None => clear_correlation_id(),
    }

    result
}

/// Logs a classified error at the level matching its severity
pub fn log_classified_error(error: &ClassifiedError) {
    use tracing::{error, info, warn};

    let message = crate::sanitization::sanitize_message(&error.message);

    match error.severity {
        Severity::Critical => error!(
            error_id = %error.id,
            request_id = %error.request_id,
            category = %error.category,
            severity = %error.severity,
            status_code = error.status_code,
            service = %error.service,
            endpoint = %error.endpoint,
            error_message = %message,
            "Critical error classified"
        ),
        Severity::High => error!(
            error_id = %error.id,
            request_id = %error.request_id,
            category = %error.category,
            severity = %error.severity,
            status_code = error.status_code,
            service = %error.service,
            error_message = %message,
            "Error classified"
        ),
        Severity::Medium => warn!(
            error_id = %error.id,
            category = %error.category,
            status_code = error.status_code,
            service = %error.service,
            error_message = %message,
            "Warning classified"
        ),
        Severity::Low => info!(
            error_id = %error.id,
            category = %error.category,
            service = %error.service,
            error_message = %message,
            "Low severity error classified"
        ),
    }
}

/// Logs a handler error; server-side kinds at error level, client-side at warn
pub fn log_handler_error(err: &Error) {
    let correlation_id = err.correlation_id.as_deref().unwrap_or("unknown");
    if err.status_code() >= 500 {
        tracing::error!(
            error_id = %err.id,
            error_kind = %err.kind,
            correlation_id = %correlation_id,
            code = ?err.code,
            error_message = %err.message,
            "Request failed"
        );
    } else {
        tracing::warn!(
            error_id = %err.id,
            error_kind = %err.kind,
            correlation_id = %correlation_id,
            code = ?err.code,
            error_message = %err.message,
            "Request rejected"
        );
    }
}

impl TryFrom<config::Config> for LoggingConfig {
    type Error = config::ConfigError;

    fn try_from(cfg: config::Config) -> std::result::Result<Self, Self::Error> {
        // Start from defaults and selectively override from the provided config.
        let mut base = LoggingConfig::default();

        if let Ok(level) = cfg.get::<String>("logging.level") {
            base.level = level;
        }
        if let Ok(service_name) = cfg.get::<String>("logging.service_name") {
            base.service_name = service_name;
        }
        if let Ok(file_output) = cfg.get::<bool>("logging.file_output") {
            base.file_output = file_output;
        }
        if let Ok(log_dir) = cfg.get::<String>("logging.log_dir") {
            base.log_dir = Some(log_dir);
        }
        if let Ok(json_format) = cfg.get::<bool>("logging.json_format") {
            base.json_format = json_format;
        }
        if let Ok(serde_json::Value::Object(map)) = cfg.get::<serde_json::Value>("logging.custom_fields") {
            base.custom_fields = map.into_iter().collect();
        }

        Ok(base)
    }
}
