use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Why a presented credential did not authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No credential header on the request.
    Missing,
    /// Nothing in the store verifies against the presented token.
    Unknown,
    /// The credential matched but was past its expiry (and is now gone).
    Expired,
}

impl AuthFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::Missing => "missing",
            AuthFailure::Unknown => "unknown",
            AuthFailure::Expired => "expired",
        }
    }
}

/// Why an authenticated actor was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    WorkerDeleted,
    WorkerNotPermitted,
    NotAssigned,
    FieldNotAllowed,
}

impl Denial {
    pub fn as_str(&self) -> &'static str {
        match self {
            Denial::WorkerDeleted => "worker_deleted",
            Denial::WorkerNotPermitted => "worker_not_permitted",
            Denial::NotAssigned => "not_assigned",
            Denial::FieldNotAllowed => "field_not_allowed",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Denial::WorkerDeleted => "the worker owning this key has been deleted",
            Denial::WorkerNotPermitted => "worker keys cannot access this endpoint",
            Denial::NotAssigned => "task is not assigned to this worker",
            Denial::FieldNotAllowed => "workers may only update status and notes",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthenticated: {}", .0.as_str())]
    Unauthenticated(AuthFailure),

    #[error("forbidden: {}", .0.as_str())]
    Forbidden(Denial),

    #[error("not found")]
    NotFound,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            // Authentication failures deliberately share 403 with policy denials.
            AppError::Unauthenticated(_) | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound => "NOT_FOUND",
            AppError::Validation(_) => "INVALID_PAYLOAD",
            AppError::AlreadyExists(_) => "ALREADY_EXISTS",
            AppError::RateLimited => "RATE_LIMITED",
            AppError::Database(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let msg = match &self {
            AppError::Unauthenticated(_) => "could not validate credentials".to_string(),
            AppError::Forbidden(denial) => denial.message().to_string(),
            AppError::NotFound => "resource not found".to_string(),
            AppError::Validation(m) => m.clone(),
            AppError::AlreadyExists(m) => m.clone(),
            AppError::RateLimited => "too many requests".to_string(),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "an unexpected error occurred".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                "an unexpected error occurred".to_string()
            }
        };

        let body = Json(json!({
            "error": {
                "type": self.error_type(),
                "message": msg,
                "status": status.as_u16(),
            }
        }));

        let mut response = (status, body).into_response();

        if matches!(self, AppError::RateLimited) {
            response.headers_mut().insert(
                "retry-after",
                axum::http::HeaderValue::from_static("60"),
            );
        }

        response
    }
}
