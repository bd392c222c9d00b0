use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use uuid::Uuid;

use super::protocol::ErrorResponse;

/// Error kinds surfaced by the core. The HTTP mapping lives here and
/// nowhere else; handlers return `Result<_, DfsError>` and let axum render.
#[derive(Debug, Error)]
pub enum DfsError {
    #[error("a live file already exists at {0}")]
    PathConflict(String),

    #[error("not enough eligible workers: {active} active, {required} required")]
    NoCapacity { active: usize, required: usize },

    #[error("no space left for chunk {0}")]
    NoSpace(Uuid),

    #[error("chunk {0} failed digest verification")]
    Corrupted(Uuid),

    #[error("peer unreachable: {0}")]
    Unreachable(String),

    #[error("upload session {0} expired or unknown")]
    SessionExpired(Uuid),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("path {0} is leased by another client")]
    LeaseHeld(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DfsError {
    /// Stable machine-readable kind, used in error payloads and matched by
    /// the client's retry logic.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PathConflict(_) => "path-conflict",
            Self::NoCapacity { .. } => "no-capacity",
            Self::NoSpace(_) => "no-space",
            Self::Corrupted(_) => "corrupted",
            Self::Unreachable(_) => "unreachable",
            Self::SessionExpired(_) => "session-expired",
            Self::NotFound(_) => "not-found",
            Self::LeaseHeld(_) => "lease-held",
            Self::Invalid(_) => "invalid",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PathConflict(_) | Self::LeaseHeld(_) => StatusCode::CONFLICT,
            Self::NoCapacity { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::NoSpace(_) => StatusCode::INSUFFICIENT_STORAGE,
            Self::Corrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unreachable(_) => StatusCode::BAD_GATEWAY,
            Self::SessionExpired(_) => StatusCode::GONE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Worth retrying with the same inputs after a delay.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::NoCapacity { .. } | Self::NoSpace(_) | Self::Unreachable(_) | Self::Internal(_)
        )
    }
}

impl IntoResponse for DfsError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        let body = ErrorResponse {
            error: self.kind().to_string(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
