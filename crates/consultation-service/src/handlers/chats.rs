//! Chat message handlers.
//!
//! - `POST /{users|doctors}/consultations/{id}/chats` - Append a text message
//! - `POST /{users|doctors}/consultations/{id}/chats/file` - Upload a file
//!   (multipart field `file`) and append it as an image or file message

use super::{consultation_id, json_body};
use crate::errors::ConsultationError;
use crate::models::api::{MessageResponse, SendMessageRequest};
use crate::models::{ConsultationId, Principal};
use crate::routes::AppState;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use std::sync::Arc;
use tracing::instrument;

/// Multipart field carrying the upload.
const FILE_FIELD: &str = "file";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[instrument(skip_all, name = "cs.handlers.send_message")]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<ConsultationId>, PathRejection>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ConsultationError> {
    let id = consultation_id(path)?;
    let request = json_body(payload)?;

    let message = state
        .orchestrator
        .send_message(&principal, id, &request.kind, &request.content)
        .await?;

    Ok((StatusCode::CREATED, Json(MessageResponse::from(&message))))
}

#[instrument(skip_all, name = "cs.handlers.upload_file")]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<ConsultationId>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ConsultationError> {
    let id = consultation_id(path)?;
    let mut multipart =
        multipart.map_err(|rejection| ConsultationError::Validation(rejection.body_text()))?;

    while let Some(field) = multipart.next_field().await.map_err(invalid_multipart)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let body = field.bytes().await.map_err(invalid_multipart)?;

        let message = state
            .orchestrator
            .upload_and_send(&principal, id, &file_name, &content_type, body)
            .await?;
        return Ok((StatusCode::CREATED, Json(MessageResponse::from(&message))));
    }

    Err(ConsultationError::Validation(format!(
        "Multipart field '{FILE_FIELD}' is required"
    )))
}

/// Body errors here include exceeding the upload limit.
fn invalid_multipart(e: MultipartError) -> ConsultationError {
    tracing::debug!(target: "cs.handlers.chats", error = %e, "Rejected multipart body");
    ConsultationError::Validation(format!("Invalid upload: {}", e.body_text()))
}
