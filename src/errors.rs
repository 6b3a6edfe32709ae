use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String, Option<String>),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    /// The one error every token-verification failure collapses into.
    /// Callers must not leak which check rejected the token.
    pub fn invalid_token() -> Self {
        Self::Unauthenticated("Invalid access token".to_string())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into(), None)
    }

    /// Conflict that names the offending field in the response `meta`.
    pub fn conflict_on_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Conflict(message.into(), Some(field.into()))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(..) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let code = match &self {
            AppError::Unauthenticated(_) => "auth.unauthenticated",
            AppError::Forbidden(_) => "auth.forbidden",
            AppError::NotFound(_) => "resource.not_found",
            AppError::Conflict(..) => "conflict",
            AppError::BadRequest(_) => "bad_request",
            AppError::Configuration(_) | AppError::Database(_) | AppError::Internal(_) => {
                "internal.error"
            }
        };

        // Sanitized boundary: database/internal detail stays in the logs,
        // never in the response body.
        let message = match &self {
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                "internal server error".to_string()
            }
            AppError::Internal(detail) | AppError::Configuration(detail) => {
                tracing::error!(detail = %detail, "internal error");
                "internal server error".to_string()
            }
            AppError::Unauthenticated(message)
            | AppError::Forbidden(message)
            | AppError::NotFound(message)
            | AppError::Conflict(message, _)
            | AppError::BadRequest(message) => message.clone(),
        };

        let meta = match &self {
            AppError::Conflict(_, Some(field)) => Some(serde_json::json!({ "field": field })),
            _ => None,
        };

        let payload = ErrorResponse {
            code: code.to_string(),
            message,
            meta,
        };

        (status, Json(payload)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}
