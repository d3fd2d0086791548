use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced by repositories, the request pipeline and handlers.
#[derive(Debug, Error)]
pub enum ForumError {
    /// Zero rows for a single-entity lookup.
    #[error("resource does not exist")]
    NotFound,

    /// Caller-supplied data failed a validation rule.
    #[error("{0}")]
    InvalidInput(String),

    /// Malformed request (unparseable path parameter, bad form field).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A capability gate refused the request.
    #[error("access denied")]
    Forbidden,

    /// Uniqueness violation in the store.
    #[error("{0}")]
    Conflict(String),

    /// A single-entity lookup matched more than one row. Filters that trip
    /// this are not selective enough; it is a programming error.
    #[error("expected 1 row, got {0}")]
    AmbiguousResult(usize),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = ForumError> = std::result::Result<T, E>;

impl From<sqlx::Error> for ForumError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::Conflict("already exists".to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                Self::InvalidInput("referenced entity does not exist".to_string())
            }
            _ => Self::Database(err),
        }
    }
}

impl ForumError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::AmbiguousResult(_) | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Replace the generic conflict message with one naming what collided.
    #[must_use]
    pub fn conflict_as(self, message: &str) -> Self {
        match self {
            Self::Conflict(_) => Self::Conflict(message.to_string()),
            other => other,
        }
    }
}

impl IntoResponse for ForumError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed");
            return (status, "Internal server error").into_response();
        }
        (status, self.to_string()).into_response()
    }
}
