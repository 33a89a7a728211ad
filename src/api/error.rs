//! API error type
//!
//! Every failure leaving the REST surface is `{code, message}` with a short
//! SHOUTY_SNAKE code from a fixed set, so clients can branch on `code`
//! without parsing prose.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;
use tracing::error;

use crate::db::RepoError;
use crate::musicbrainz::MusicBrainzError;
use crate::queue::QueueError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Upstream(String),
    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "INVALID_REQUEST",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::Internal => "INTERNAL_ERROR",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        }))
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ApiError::NotFound("not found".to_string()),
            RepoError::Conflict(what) => ApiError::Conflict(what),
            other => {
                error!("repository error: {}", other);
                ApiError::Internal
            }
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(id) => ApiError::NotFound(format!("job {}", id)),
            QueueError::Empty => ApiError::NotFound("queue empty".to_string()),
            other => {
                error!("queue error: {}", other);
                ApiError::Internal
            }
        }
    }
}

impl From<MusicBrainzError> for ApiError {
    fn from(err: MusicBrainzError) -> Self {
        match err {
            MusicBrainzError::NotFound => ApiError::NotFound("catalogue entity".to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<crate::core::matcher::MatchError> for ApiError {
    fn from(err: crate::core::matcher::MatchError) -> Self {
        match err {
            crate::core::matcher::MatchError::Catalogue(e) => e.into(),
            crate::core::matcher::MatchError::Repo(e) => e.into(),
        }
    }
}
