//! Application error handling

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rounds_core::{ContextError, ErrorBody, ErrorKind, FieldError, RateLimitDecision};
use thiserror::Error;

use crate::db::StoreError;
use crate::middleware::rate_limit::apply_rate_limit_headers;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limit exceeded until {}", .0.reset_at)]
    RateLimited(RateLimitDecision),

    #[error("validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Unauthorized(_) => ErrorKind::Authentication,
            AppError::RateLimited(_) => ErrorKind::RateLimitExceeded,
            AppError::Validation(_) | AppError::BadRequest(_) => ErrorKind::Validation,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (body, decision) = match self {
            AppError::Unauthorized(msg) => (ErrorBody::authentication(&msg), None),
            AppError::RateLimited(decision) => {
                (ErrorBody::rate_limited(decision.reset_at), Some(decision))
            }
            AppError::Validation(fields) => (
                ErrorBody::validation("Request failed validation", fields),
                None,
            ),
            AppError::BadRequest(msg) => (ErrorBody::validation(&msg, Vec::new()), None),
            AppError::NotFound(msg) => (ErrorBody::not_found(&msg), None),
            AppError::Conflict(msg) => (ErrorBody::conflict(&msg), None),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (ErrorBody::internal(), None)
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(decision) = decision {
            apply_rate_limit_headers(response.headers_mut(), &decision);
        }
        response
    }
}

impl From<ContextError> for AppError {
    fn from(err: ContextError) -> Self {
        AppError::Internal(format!("Context error: {}", err))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Unavailable(msg) => AppError::Internal(format!("Store error: {}", msg)),
        }
    }
}
