//! Handler errors rendered as JSON `{error, status}`

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Error type returned by every handler
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Malformed input (400)
    #[error("{0}")]
    BadRequest(String),

    /// A provider's credentials aren't set (503)
    #[error("{0} is not configured on this server")]
    NotConfigured(&'static str),

    /// A third-party service failed (502)
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl ServerError {
    /// Status code for this error
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Wrap a provider failure, logging the details
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        tracing::warn!("upstream failure: {err:#}");
        Self::Upstream(err.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string(), "status": status.as_u16() }))).into_response()
    }
}
