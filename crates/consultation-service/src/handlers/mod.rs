//! HTTP and WebSocket handlers for the consultation service.
//!
//! Handlers are thin: they extract the principal and body, call the
//! [`RoomOrchestrator`](crate::orchestrator::RoomOrchestrator) and shape
//! the response. Extractor rejections are reported as `VALIDATION_ERROR`.

pub mod artifacts;
pub mod chats;
pub mod consultations;
pub mod health;
pub mod metrics;
pub mod rooms;

pub use artifacts::{add_prescription_to_cart, create_certificate, create_prescription};
pub use chats::{send_message, upload_file};
pub use consultations::{create_consultation, end_session, get_consultation, list_consultations};
pub use health::health_check;
pub use metrics::metrics_handler;
pub use rooms::join_room;

use crate::errors::ConsultationError;
use crate::models::ConsultationId;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::Json;

/// Unwrap a JSON body, reporting malformed input as a validation error.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ConsultationError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        tracing::debug!(target: "cs.handlers", error = %rejection, "Rejected request body");
        ConsultationError::Validation(rejection.body_text())
    })
}

/// Unwrap a query string, reporting malformed input as a validation error.
pub(crate) fn query_params<T>(
    query: Result<Query<T>, QueryRejection>,
) -> Result<T, ConsultationError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ConsultationError::Validation(rejection.body_text()))
}

/// Parse the `{id}` path segment.
pub(crate) fn consultation_id(
    path: Result<Path<ConsultationId>, PathRejection>,
) -> Result<ConsultationId, ConsultationError> {
    let Path(id) = path.map_err(|_| {
        ConsultationError::Validation("Consultation id must be a positive integer".to_string())
    })?;
    if id <= 0 {
        return Err(ConsultationError::Validation(
            "Consultation id must be a positive integer".to_string(),
        ));
    }
    Ok(id)
}
