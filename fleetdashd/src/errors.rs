//! HTTP boundary error type.
//!
//! Every handler returns `Result<_, ApiError>`. The response body is always
//! `{"success": false, "error": <message>, "kind": <kind>}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fleetdash_common::ValidationError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::git::GitError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Request is well-formed but violates a sandbox policy.
    #[error("{0}")]
    Forbidden(String),

    /// A remote worker or control endpoint failed.
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Forbidden(_) => "policy",
            Self::Upstream(_) => "upstream",
            Self::Internal(_) => "internal",
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation(ValidationError::Invalid {
            field,
            reason: reason.into(),
        })
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => Self::Conflict(err.to_string()),
            StoreError::NotFound(_) => Self::NotFound(err.to_string()),
            StoreError::Database(_) | StoreError::Unavailable(_) => {
                // Driver text stays in the log, never in the response body.
                error!("Store failure: {}", err);
                Self::Internal("database error".to_string())
            }
        }
    }
}

impl From<GitError> for ApiError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::PathMissing(_) | GitError::NotARepository(_) | GitError::OutsideRoots(_) => {
                Self::Forbidden(err.to_string())
            }
            GitError::CommitNotFound { .. } => Self::NotFound(err.to_string()),
            GitError::Command(_) | GitError::Metadata(_) => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), status = status.as_u16(), "Request failed: {}", self);
        } else {
            warn!(kind = self.kind(), status = status.as_u16(), "Request rejected: {}", self);
        }

        (
            status,
            Json(json!({
                "success": false,
                "error": self.to_string(),
                "kind": self.kind(),
            })),
        )
            .into_response()
    }
}
