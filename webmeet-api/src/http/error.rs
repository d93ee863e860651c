// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use webmeet_hub::HubError;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    // Convenience alias
    pub fn internal(message: impl Into<String>) -> Self {
        Self::internal_server_error(message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Convert webmeet_core errors to HTTP errors
impl From<webmeet_core::Error> for AppError {
    fn from(err: webmeet_core::Error) -> Self {
        use webmeet_core::Error;

        match err {
            Error::NotFound(msg) => Self::not_found(msg),
            Error::Sfu(msg) => {
                tracing::error!("Media server error: {}", msg);
                Self::new(StatusCode::BAD_GATEWAY, "Media server error")
            }
            Error::Timeout(msg) => {
                tracing::error!("Timeout: {}", msg);
                Self::new(StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out")
            }
            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                Self::internal_server_error("Data processing error")
            }
            Error::Config(e) => {
                tracing::error!("Configuration error: {}", e);
                Self::internal_server_error("Internal server error")
            }
        }
    }
}

/// The hub loop has stopped, typically during shutdown
impl From<HubError> for AppError {
    fn from(err: HubError) -> Self {
        tracing::warn!("Hub unavailable: {}", err);
        Self::service_unavailable("Connection hub is not running")
    }
}

/// Convert serde_json errors to HTTP errors
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request(format!("JSON error: {err}"))
    }
}

/// Convert anyhow errors to HTTP errors
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Anyhow error: {}", err);
        Self::internal_server_error("Internal server error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_status_mapping() {
        let err: AppError = webmeet_core::Error::NotFound("room".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "room");

        let err: AppError = webmeet_core::Error::Sfu("session gone".into()).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.message, "Media server error");
    }

    #[test]
    fn test_hub_error_is_unavailable() {
        let err: AppError = HubError::Closed.into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
