//! Mapping engine failures to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use config::ConfigError;
use thiserror::Error;

/// Failure of a request or of the service setup.
#[derive(Error, Debug)]
pub enum ApiError {
    /// An engine operation failed.
    #[error(transparent)]
    Engine(#[from] wansim_tc::Error),

    /// The configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// The HTTP status reported for this error.
    pub fn status(&self) -> StatusCode {
        use wansim_tc::Error as E;

        match self {
            ApiError::Engine(E::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Engine(E::InsufficientTopology(_)) => StatusCode::PRECONDITION_FAILED,
            ApiError::Engine(E::ExecutionUncertain { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Engine(E::Inspection(_) | E::Execution(_) | E::Rejected { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = serde_json::json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Result of a handler or of configuration loading.
pub type Result<T> = std::result::Result<T, ApiError>;

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::Config(err.to_string())
    }
}
