//! Consultation service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl.
//! Database and upstream failures are logged server-side and surfaced
//! with a generic message. Internal failures carry a correlation id that
//! appears both in the log line and in the response body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Consultation service error type.
///
/// Maps to HTTP status codes:
/// - Validation, NotEnoughStock, DoctorNotVerified: 400 Bad Request
/// - InvalidToken: 401 Unauthorized
/// - Forbidden: 403 Forbidden
/// - NotFound: 404 Not Found
/// - ActiveSessionExists, AlreadyAttached, AlreadyEnded, SessionEnded,
///   SessionNotActive: 409 Conflict
/// - Database, Upstream: 424 Failed Dependency
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum ConsultationError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Doctor is not verified")]
    DoctorNotVerified,

    #[error("An active consultation already exists for this doctor")]
    ActiveSessionExists,

    #[error("Artifact already attached: {0}")]
    AlreadyAttached(String),

    #[error("Consultation has already ended")]
    AlreadyEnded,

    #[error("Consultation has ended")]
    SessionEnded,

    #[error("Consultation is not active")]
    SessionNotActive,

    #[error("Not enough stock: {0}")]
    NotEnoughStock(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConsultationError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            ConsultationError::Validation(_)
            | ConsultationError::NotEnoughStock(_)
            | ConsultationError::DoctorNotVerified => 400,
            ConsultationError::InvalidToken(_) => 401,
            ConsultationError::Forbidden(_) => 403,
            ConsultationError::NotFound(_) => 404,
            ConsultationError::ActiveSessionExists
            | ConsultationError::AlreadyAttached(_)
            | ConsultationError::AlreadyEnded
            | ConsultationError::SessionEnded
            | ConsultationError::SessionNotActive => 409,
            ConsultationError::Database(_) | ConsultationError::Upstream(_) => 424,
            ConsultationError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ConsultationError::Validation(_) => "VALIDATION_ERROR",
            ConsultationError::InvalidToken(_) => "INVALID_TOKEN",
            ConsultationError::Forbidden(_) => "FORBIDDEN",
            ConsultationError::NotFound(_) => "NOT_FOUND",
            ConsultationError::DoctorNotVerified => "DOCTOR_NOT_VERIFIED",
            ConsultationError::ActiveSessionExists => "ACTIVE_SESSION_EXISTS",
            ConsultationError::AlreadyAttached(_) => "ALREADY_ATTACHED",
            ConsultationError::AlreadyEnded => "ALREADY_ENDED",
            ConsultationError::SessionEnded => "SESSION_ENDED",
            ConsultationError::SessionNotActive => "SESSION_NOT_ACTIVE",
            ConsultationError::NotEnoughStock(_) => "NOT_ENOUGH_STOCK",
            ConsultationError::Database(_) => "DATABASE_ERROR",
            ConsultationError::Upstream(_) => "UPSTREAM_ERROR",
            ConsultationError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

impl IntoResponse for ConsultationError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = self.code();
        let mut correlation_id = None;

        let message = match &self {
            ConsultationError::Database(err) => {
                tracing::error!(target: "cs.database", error = %err, "Database operation failed");
                "A storage dependency failed, please retry".to_string()
            }
            ConsultationError::Upstream(err) => {
                tracing::error!(target: "cs.upstream", error = %err, "Upstream dependency failed");
                "An upstream dependency failed, please retry".to_string()
            }
            ConsultationError::Internal(err) => {
                let id = Uuid::new_v4().to_string();
                tracing::error!(
                    target: "cs.internal",
                    correlation_id = %id,
                    error = %err,
                    "Unexpected internal error"
                );
                correlation_id = Some(id);
                "An internal error occurred".to_string()
            }
            ConsultationError::Validation(reason)
            | ConsultationError::InvalidToken(reason)
            | ConsultationError::Forbidden(reason)
            | ConsultationError::NotFound(reason)
            | ConsultationError::NotEnoughStock(reason) => reason.clone(),
            other => other.to_string(),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                correlation_id,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) =
                "Bearer realm=\"consultations\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

/// Convert sqlx errors to ConsultationError
impl From<sqlx::Error> for ConsultationError {
    fn from(err: sqlx::Error) -> Self {
        ConsultationError::Database(err.to_string())
    }
}
