//! Error types for the cache engines
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type shared by every cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key or hash field is absent, or already logically expired
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Stored value has a different shape than the operation expects
    #[error("Wrong type: {0}")]
    WrongType(String),

    /// Increment attempted on a value that is not an integer
    #[error("Value is not an integer: {0}")]
    NotNumeric(String),

    /// The remote store could not be reached or the call failed in transit
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// A per-operation deadline elapsed before the remote store answered
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A value could not be encoded or decoded
    #[error("Serialization failure: {0}")]
    Serialization(String),

    /// The configured driver name is not recognized
    #[error("Unsupported cache driver: {0}")]
    UnsupportedDriver(String),

    /// Caller-supplied argument is out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine has been closed
    #[error("Cache is closed")]
    Closed,
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::WrongType(_) => StatusCode::CONFLICT,
            CacheError::NotNumeric(_) | CacheError::InvalidArgument(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CacheError::Serialization(_) => StatusCode::BAD_REQUEST,
            CacheError::ConnectionFailure(_) | CacheError::Closed => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CacheError::UnsupportedDriver(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
