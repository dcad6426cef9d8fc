//! Consultation lifecycle handlers.
//!
//! - `POST /users/consultations` - Create a consultation (user)
//! - `GET /{users|doctors}/consultations` - List the caller's consultations
//! - `GET /{users|doctors}/consultations/{id}` - Load the transcript
//! - `POST /{users|doctors}/consultations/{id}/end` - End the session

use super::{consultation_id, json_body, query_params};
use crate::errors::ConsultationError;
use crate::models::api::{
    ConsultationPageResponse, ConsultationResponse, CreateConsultationRequest,
    EndSessionResponse, ListConsultationsQuery, MessageResponse, TranscriptResponse,
};
use crate::models::{ConsultationId, Principal};
use crate::routes::AppState;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for `POST /users/consultations`.
///
/// Returns 201 with the new consultation in `pending` status.
#[instrument(skip_all, name = "cs.handlers.create_consultation", fields(user_id = principal.id))]
pub async fn create_consultation(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<CreateConsultationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ConsultationResponse>), ConsultationError> {
    let request = json_body(payload)?;
    let consultation = state.orchestrator.create(&principal, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ConsultationResponse::from(&consultation)),
    ))
}

/// Handler for `GET /{users|doctors}/consultations?status=&page=&limit=`.
#[instrument(skip_all, name = "cs.handlers.list_consultations")]
pub async fn list_consultations(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<ListConsultationsQuery>, QueryRejection>,
) -> Result<Json<ConsultationPageResponse>, ConsultationError> {
    let query = query_params(query)?;
    let page = state.orchestrator.list(&principal, query).await?;

    Ok(Json(ConsultationPageResponse::from(&page)))
}

/// Handler for `GET /{users|doctors}/consultations/{id}`.
#[instrument(skip_all, name = "cs.handlers.get_consultation")]
pub async fn get_consultation(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<ConsultationId>, PathRejection>,
) -> Result<Json<TranscriptResponse>, ConsultationError> {
    let id = consultation_id(path)?;
    let transcript = state.orchestrator.load_transcript(&principal, id).await?;

    Ok(Json(TranscriptResponse {
        consultation: ConsultationResponse::from(&transcript.consultation),
        messages: transcript
            .messages
            .iter()
            .map(MessageResponse::from)
            .collect(),
    }))
}

/// Handler for `POST /{users|doctors}/consultations/{id}/end`.
///
/// Ending an already ended session returns the original `ended_at`.
#[instrument(skip_all, name = "cs.handlers.end_session")]
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<ConsultationId>, PathRejection>,
) -> Result<Json<EndSessionResponse>, ConsultationError> {
    let id = consultation_id(path)?;
    let outcome = state.orchestrator.end_session(&principal, id).await?;

    Ok(Json(EndSessionResponse {
        id,
        ended_at: outcome.ended_at,
    }))
}
