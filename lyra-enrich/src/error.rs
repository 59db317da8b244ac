//! HTTP error mapping for lyra-enrich
//!
//! Every handler returns [`ApiResult`]; core errors convert into [`ApiError`]
//! and render as `{"error": {"code", "message"}}` with the status below.
//!
//! | kind                                   | status |
//! |----------------------------------------|--------|
//! | Validation / bad request               | 400    |
//! | Authorization                          | 403    |
//! | NotFound                               | 404    |
//! | Database / Internal / Io / Config      | 500    |
//! | Provider / TransientProvider / fetch   | 502    |
//! | Cancelled                              | 503    |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request shape (400), before reaching the core
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or invalid caller identity (401)
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Core error, mapped by kind
    #[error(transparent)]
    Core(#[from] lyra_common::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        use lyra_common::Error as E;

        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            ApiError::Core(err) => match err {
                E::Validation { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                E::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                E::Authorization(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                E::Database { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
                E::TransientProvider(_) | E::Provider(_) => {
                    (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR")
                }
                E::AudioFetch(_) => (StatusCode::BAD_GATEWAY, "AUDIO_FETCH_ERROR"),
                E::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "CANCELLED"),
                E::Config(_) | E::Io(_) | E::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
