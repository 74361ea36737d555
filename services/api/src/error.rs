//! services/api/src/error.rs
//!
//! Error types for the API service: `ApiError` for startup failures returned
//! from `main`, and `HttpError` for everything a handler can answer with.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::config::ConfigError;
use flashcards_core::finalize::FinalizeError;
use flashcards_core::generation::GenerationError;
use flashcards_core::library::LibraryError;
use flashcards_core::ports::PortError;
use flashcards_core::validation::ValidationErrors;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

//=========================================================================================
// HttpError
//=========================================================================================

/// A failed request, rendered as
/// `{"error": <code>, "message": <text>, "details"?: {...}, "retryable"?: bool}`.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("{message}")]
    Unprocessable { code: &'static str, message: String },
    #[error("{message}")]
    Unavailable {
        code: &'static str,
        message: String,
        retryable: bool,
    },
    #[error("Request timed out")]
    Timeout,
    /// `cause` is logged; the client only sees `message`.
    #[error("{cause}")]
    Internal {
        code: &'static str,
        message: &'static str,
        cause: String,
        retryable: bool,
    },
}

impl HttpError {
    pub fn internal(cause: impl Into<String>) -> Self {
        HttpError::Internal {
            code: "internal_error",
            message: "An internal error occurred",
            cause: cause.into(),
            retryable: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::Validation(_) | HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::Conflict(_) => StatusCode::CONFLICT,
            HttpError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            HttpError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            HttpError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            HttpError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            HttpError::Validation(fields) => json!({
                "error": "validation_error",
                "message": "Request validation failed",
                "details": fields,
            }),
            HttpError::BadRequest(msg) => json!({ "error": "bad_request", "message": msg }),
            HttpError::Unauthorized(msg) => json!({ "error": "unauthorized", "message": msg }),
            HttpError::NotFound(msg) => json!({ "error": "not_found", "message": msg }),
            HttpError::Conflict(msg) => json!({ "error": "conflict", "message": msg }),
            HttpError::Unprocessable { code, message } => {
                json!({ "error": code, "message": message })
            }
            HttpError::Unavailable {
                code,
                message,
                retryable,
            } => json!({ "error": code, "message": message, "retryable": retryable }),
            HttpError::Timeout => json!({
                "error": "timeout",
                "message": "The request took too long. Please try again.",
                "retryable": true,
            }),
            HttpError::Internal {
                code,
                message,
                cause,
                retryable,
            } => {
                error!(code, cause = %cause, "Request failed with an internal error");
                let mut body = json!({ "error": code, "message": message });
                if *retryable {
                    body["retryable"] = Value::Bool(true);
                }
                body
            }
        };
        (status, Json(body)).into_response()
    }
}

//=========================================================================================
// Conversions
//=========================================================================================

impl From<ValidationErrors> for HttpError {
    fn from(errors: ValidationErrors) -> Self {
        HttpError::Validation(errors)
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        HttpError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for HttpError {
    fn from(rejection: PathRejection) -> Self {
        HttpError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for HttpError {
    fn from(rejection: QueryRejection) -> Self {
        HttpError::BadRequest(rejection.body_text())
    }
}

impl From<PortError> for HttpError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(what) => HttpError::NotFound(what),
            PortError::Conflict(msg) => HttpError::Conflict(msg),
            PortError::Unauthorized => HttpError::Unauthorized("Authentication required".into()),
            PortError::Unexpected(cause) => HttpError::internal(cause),
        }
    }
}

impl From<GenerationError> for HttpError {
    fn from(e: GenerationError) -> Self {
        let retryable = e.is_retryable();
        match e {
            GenerationError::ServiceNotConfigured => HttpError::Unavailable {
                code: "service_not_configured",
                message: "The AI service is not configured".into(),
                retryable,
            },
            // Upstream error bodies stay in the log.
            GenerationError::GenerationFailed(cause) => {
                warn!(cause = %cause, "Answering with generation_failed");
                HttpError::Unavailable {
                    code: "generation_failed",
                    message: "Flashcard generation failed. Please try again later.".into(),
                    retryable,
                }
            }
            GenerationError::ResponseParseError(cause) => HttpError::Internal {
                code: "response_parse_error",
                message: "The AI returned a response that could not be used",
                cause: cause.to_string(),
                retryable,
            },
            GenerationError::DatabaseError(cause) => HttpError::Internal {
                code: "database_error",
                message: "A database error occurred",
                cause,
                retryable,
            },
            GenerationError::Timeout => HttpError::Timeout,
        }
    }
}

impl From<FinalizeError> for HttpError {
    fn from(e: FinalizeError) -> Self {
        match e {
            FinalizeError::SessionNotFound(_) => HttpError::NotFound(e.to_string()),
            FinalizeError::SessionAlreadyUsed(_) => HttpError::Unprocessable {
                code: "session_already_used",
                message: e.to_string(),
            },
            FinalizeError::DatabaseError(cause) => HttpError::Internal {
                code: "database_error",
                message: "A database error occurred",
                cause,
                retryable: false,
            },
        }
    }
}

impl From<LibraryError> for HttpError {
    fn from(e: LibraryError) -> Self {
        match e {
            LibraryError::NotFound(what) => HttpError::NotFound(format!("{} not found", what)),
            LibraryError::DatabaseError(cause) => HttpError::Internal {
                code: "database_error",
                message: "A database error occurred",
                cause,
                retryable: false,
            },
        }
    }
}
