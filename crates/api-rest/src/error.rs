//! HTTP error mapping with structured JSON bodies.

use api_shared::AuthError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hemogram_core::LabError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {message}")]
    Conflict {
        code: &'static str,
        message: String,
    },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Unauthorized(detail) => (StatusCode::UNAUTHORIZED, "AUTH_REQUIRED", detail),
            ApiError::Forbidden(detail) => (StatusCode::FORBIDDEN, "FORBIDDEN", detail),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail),
            ApiError::Conflict { code, message } => (StatusCode::CONFLICT, code, message),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<LabError> for ApiError {
    fn from(err: LabError) -> Self {
        let message = err.to_string();
        match err {
            LabError::InvalidInput(_)
            | LabError::DuplicateCategory(_)
            | LabError::CategoryOutOfRange(_)
            | LabError::UnknownCategory(_) => ApiError::BadRequest(message),
            LabError::NotFound { .. } => ApiError::NotFound(message),
            LabError::AlreadyFinalized(_) => ApiError::Conflict {
                code: "ALREADY_FINALIZED",
                message,
            },
            LabError::AlreadyCompleted(_) => ApiError::Conflict {
                code: "ALREADY_COMPLETED",
                message,
            },
            LabError::ReviewConflict(_) => ApiError::Conflict {
                code: "REVIEW_CONFLICT",
                message,
            },
            LabError::DuplicateMorphology(_) => ApiError::Conflict {
                code: "DUPLICATE_MORPHOLOGY",
                message,
            },
            LabError::StorageDirCreation(_)
            | LabError::FileWrite(_)
            | LabError::FileRead(_)
            | LabError::Serialization(_)
            | LabError::Deserialization(_)
            | LabError::YamlSerialization(_)
            | LabError::YamlDeserialization(_)
            | LabError::LockPoisoned => ApiError::Internal(message),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Forbidden { .. } => ApiError::Forbidden(err.to_string()),
            AuthError::MissingApiKey
            | AuthError::InvalidApiKey
            | AuthError::MissingUser
            | AuthError::InvalidRole(_) => ApiError::Unauthorized(err.to_string()),
        }
    }
}
