//! Artifact and cart handlers.
//!
//! - `POST /doctors/consultations/{id}/certificate` - Issue a medical certificate
//! - `POST /doctors/consultations/{id}/prescription` - Issue a prescription
//! - `POST /users/consultations/{id}/prescription/add` - Add the prescription
//!   to the user's cart at one pharmacy

use super::{consultation_id, json_body};
use crate::errors::ConsultationError;
use crate::models::api::{
    AddToCartRequest, CartConversionResponse, CartLineResponse, CertificateRequest,
    CertificateResponse, PrescriptionRequest, PrescriptionResponse,
};
use crate::models::{ConsultationId, Principal};
use crate::routes::AppState;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::{Extension, Json};
use std::sync::Arc;
use tracing::instrument;

#[instrument(skip_all, name = "cs.handlers.create_certificate")]
pub async fn create_certificate(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<ConsultationId>, PathRejection>,
    payload: Result<Json<CertificateRequest>, JsonRejection>,
) -> Result<Json<CertificateResponse>, ConsultationError> {
    let id = consultation_id(path)?;
    let request = json_body(payload)?;

    let certificate_url = state
        .orchestrator
        .create_certificate(&principal, id, request)
        .await?;

    Ok(Json(CertificateResponse { certificate_url }))
}

#[instrument(skip_all, name = "cs.handlers.create_prescription")]
pub async fn create_prescription(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<ConsultationId>, PathRejection>,
    payload: Result<Json<PrescriptionRequest>, JsonRejection>,
) -> Result<Json<PrescriptionResponse>, ConsultationError> {
    let id = consultation_id(path)?;
    let request = json_body(payload)?;

    let prescription_url = state
        .orchestrator
        .create_prescription(&principal, id, request)
        .await?;

    Ok(Json(PrescriptionResponse { prescription_url }))
}

/// Handler for `POST /users/consultations/{id}/prescription/add`.
///
/// All or nothing: a single unavailable or short line refuses the batch
/// with `NOT_ENOUGH_STOCK` and leaves the cart untouched.
#[instrument(skip_all, name = "cs.handlers.add_prescription_to_cart")]
pub async fn add_prescription_to_cart(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<ConsultationId>, PathRejection>,
    payload: Result<Json<AddToCartRequest>, JsonRejection>,
) -> Result<Json<CartConversionResponse>, ConsultationError> {
    let id = consultation_id(path)?;
    let request = json_body(payload)?;

    let conversion = state
        .orchestrator
        .add_prescription_to_cart(&principal, id, request.pharmacy_id)
        .await?;

    Ok(Json(CartConversionResponse {
        pharmacy_id: conversion.pharmacy_id,
        items: conversion
            .lines
            .iter()
            .map(|line| CartLineResponse {
                pharmacy_product_id: line.pharmacy_product_id,
                product_id: line.product_id,
                quantity: line.quantity,
                price: line.price,
            })
            .collect(),
    }))
}
