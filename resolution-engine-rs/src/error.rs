use shared_types::{ParseEnumError, ResolutionStatus};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    #[error("Resolution attempt not found: {0}")]
    AttemptNotFound(String),

    #[error(transparent)]
    UnknownStrategy(#[from] ParseEnumError),

    #[error("Illegal transition for attempt {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ResolutionStatus,
        to: ResolutionStatus,
    },
}

impl From<ResolutionError> for error_handling::Error {
    fn from(err: ResolutionError) -> Self {
        match &err {
            ResolutionError::AttemptNotFound(_) => error_handling::Error::not_found(err.to_string())
                .code("RESOLUTION_NOT_FOUND"),
            ResolutionError::UnknownStrategy(_) => error_handling::Error::validation(err.to_string())
                .code("UNKNOWN_STRATEGY"),
            ResolutionError::InvalidTransition { .. } => error_handling::Error::conflict(err.to_string())
                .code("INVALID_TRANSITION"),
        }
    }
}
