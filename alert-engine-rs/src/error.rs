use shared_types::AlertStatus;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlertError {
    #[error("Alert not found: {0}")]
    AlertNotFound(String),

    #[error("Alert {id} cannot be {action} while {status}")]
    InvalidState {
        id: String,
        status: AlertStatus,
        action: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotificationError {
    #[error("Channel {0} is not configured")]
    NotConfigured(&'static str),

    #[error("Delivery through {channel} failed: {reason}")]
    DeliveryFailed { channel: &'static str, reason: String },
}

impl From<AlertError> for error_handling::Error {
    fn from(err: AlertError) -> Self {
        match &err {
            AlertError::AlertNotFound(_) => error_handling::Error::not_found(err.to_string()).code("ALERT_NOT_FOUND"),
            AlertError::InvalidState { .. } => {
                error_handling::Error::conflict(err.to_string()).code("INVALID_ALERT_STATE")
            }
        }
    }
}
