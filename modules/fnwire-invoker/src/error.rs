use axum::http::StatusCode;
use fnwire_events::{ConversionError, DetectionError};
use thiserror::Error;

/// Reasons a request never reaches the function.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The body fits no known wire format
    #[error(transparent)]
    Detection(#[from] DetectionError),

    /// The body was recognised but has no equivalent in the function's format
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The body could not be read or was declared JSON but was not
    #[error("unreadable request body: {0}")]
    Body(String),
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::Detection(_) | RequestError::Body(_) => StatusCode::BAD_REQUEST,
            RequestError::Conversion(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A function failed while handling its own request.
#[derive(Debug, Error)]
pub enum HandlerFault {
    /// Returned `Err` or passed an error to its callback
    #[error("{0:#}")]
    Failed(anyhow::Error),

    #[error("function panicked: {0}")]
    Panicked(String),

    #[error("function dropped its callback without invoking it")]
    CallbackDropped,

    /// The task running the function was aborted before it produced an outcome
    #[error("function task was aborted")]
    Aborted,
}

/// Invalid environment configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}
