//! Unified error handling with Sentry integration.
//!
//! Errors that end a request early are turned into plain responses here and
//! reported to Sentry first. Clients never see internal detail.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application-level error type for the server.
#[derive(Debug, Error)]
pub enum AppError {
    /// The upstream response body failed while it was being buffered.
    #[error("Response body error: {0}")]
    ResponseBody(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let event_id = sentry::capture_error(&self);
        tracing::error!(
            error = %self,
            sentry_event_id = %event_id,
            "Request error"
        );

        let (status, message) = match &self {
            Self::ResponseBody(_) => (StatusCode::BAD_GATEWAY, "Bad gateway"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        (status, message).into_response()
    }
}
