use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use intake_core::{LinkError, SubmissionError, TokenError, ValidationError};
use intake_notifications::SmsError;

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Sms(#[from] SmsError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Token(_) => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Sms(SmsError::InvalidPhone(_)) => StatusCode::BAD_REQUEST,
            ApiError::Sms(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Token(err) => err.code(),
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Sms(err) => err.code(),
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            // Which token check failed stays in the server log.
            ApiError::Token(err) => json!({
                "error": err.user_message(),
                "code": self.code(),
            }),
            ApiError::Validation(err) => json!({
                "error": "Please correct the highlighted field and submit again.",
                "code": self.code(),
                "field": err.field,
                "reason": err.reason,
            }),
            ApiError::BadRequest(msg) | ApiError::ServiceUnavailable(msg) => json!({
                "error": msg,
                "code": self.code(),
            }),
            ApiError::NotFound => json!({
                "error": "Page not found.",
                "code": self.code(),
            }),
            ApiError::Sms(err) => json!({
                "success": false,
                "error": err.to_string(),
                "code": self.code(),
            }),
            ApiError::Internal(_) => json!({
                "error": "Internal server error. Please try again later.",
                "code": self.code(),
            }),
        }
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::Token(e) => ApiError::Token(e),
            SubmissionError::Validation(e) => ApiError::Validation(e),
        }
    }
}

impl From<LinkError> for ApiError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::MissingIdentifier { .. } | LinkError::IdentifierTooLong { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            LinkError::InvalidBaseUrl { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            ApiError::Token(err) => {
                tracing::warn!(reason = err.kind(), "Rejected form link");
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
            }
            _ => {}
        }
        (status, Json(self.body())).into_response()
    }
}
