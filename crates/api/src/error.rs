//! API error types with HTTP response mapping.
//!
//! Every error renders as `{"error": {"code", "message", "details"}}`.

use analytics::AnalyticsError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{ErrorKind, OrderError};
use serde_json::{Value, json};
use thiserror::Error;

const INTERNAL_MESSAGE: &str = "internal server error";

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request: bad JSON, path or query parameter.
    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Order(err) => match err.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Analytics(AnalyticsError::InvalidRange { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Analytics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. } => code,
            ApiError::Order(err) => err.code(),
            ApiError::Analytics(AnalyticsError::InvalidRange { .. }) => "analytics.invalid_range",
            ApiError::Analytics(_) => "analytics.internal",
        }
    }

    fn details(&self) -> Value {
        match self {
            ApiError::Order(err) if err.kind() != ErrorKind::Internal => err.details(),
            ApiError::Analytics(AnalyticsError::InvalidRange { from, to }) => {
                json!({ "from": from, "to": to })
            }
            _ => Value::Null,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal server error");
            INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "error": {
                "code": self.code(),
                "message": message,
                "details": self.details(),
            }
        });
        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request("request.invalid_body", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request("request.invalid_query", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_request("request.invalid_path", rejection.body_text())
    }
}
