//! HTTP request and response bodies.

use super::{
    Consultation, Message, MessageKind, Page, PrescriptionItem, SessionState, Side,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /users/consultations`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateConsultationRequest {
    pub doctor_id: i64,
    pub patient_gender_id: i16,
    pub patient_name: String,
    /// ISO-8601 `YYYY-MM-DD`.
    pub patient_birth_date: String,
}

/// Query string for consultation listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListConsultationsQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Body of `POST .../chats` and inbound socket text frames.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(rename = "type", default = "default_message_type")]
    pub kind: String,
}

fn default_message_type() -> String {
    MessageKind::Text.as_str().to_string()
}

/// Body of `POST /doctors/consultations/{id}/certificate`.
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateRequest {
    pub start_date: String,
    pub end_date: String,
    pub diagnosis: String,
    pub patient_age: i32,
}

/// Body of `POST /doctors/consultations/{id}/prescription`.
#[derive(Debug, Clone, Deserialize)]
pub struct PrescriptionRequest {
    pub products: Vec<i64>,
    pub quantities: Vec<i32>,
    pub patient_age: i32,
}

/// Body of `POST /users/consultations/{id}/prescription/add`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddToCartRequest {
    pub pharmacy_id: i64,
}

/// Consultation as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationResponse {
    pub id: i64,
    pub doctor_id: i64,
    pub user_id: i64,
    pub patient_name: String,
    pub patient_birth_date: NaiveDate,
    pub patient_gender_id: i16,
    pub status: SessionState,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub certificate_url: Option<String>,
    pub prescription_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prescription_items: Vec<PrescriptionItem>,
}

impl From<&Consultation> for ConsultationResponse {
    fn from(c: &Consultation) -> Self {
        Self {
            id: c.id,
            doctor_id: c.doctor_id,
            user_id: c.user_id,
            patient_name: c.patient.name.clone(),
            patient_birth_date: c.patient.birth_date,
            patient_gender_id: c.patient.gender_id,
            status: c.state(),
            created_at: c.created_at,
            ended_at: c.ended_at,
            certificate_url: c.certificate_url.clone(),
            prescription_url: c.prescription_url.clone(),
            prescription_items: c.prescription_items.clone(),
        }
    }
}

/// Transcript entry as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: i64,
    pub ordinal: i64,
    pub sender_side: Option<Side>,
    pub kind: MessageKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessageResponse {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id,
            ordinal: m.ordinal,
            sender_side: m.sender_side,
            kind: m.kind,
            content: m.content.clone(),
            created_at: m.created_at,
        }
    }
}

/// Response of `GET .../consultations/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub consultation: ConsultationResponse,
    pub messages: Vec<MessageResponse>,
}

/// Response of consultation listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationPageResponse {
    pub items: Vec<ConsultationResponse>,
    pub page: u32,
    pub limit: u32,
    pub total: i64,
}

impl From<&Page<Consultation>> for ConsultationPageResponse {
    fn from(page: &Page<Consultation>) -> Self {
        Self {
            items: page.items.iter().map(ConsultationResponse::from).collect(),
            page: page.page,
            limit: page.limit,
            total: page.total,
        }
    }
}

/// Response of `POST .../end`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndSessionResponse {
    pub id: i64,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateResponse {
    pub certificate_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionResponse {
    pub prescription_url: String,
}

/// One cart line produced by the prescription conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineResponse {
    pub pharmacy_product_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartConversionResponse {
    pub pharmacy_id: i64,
    pub items: Vec<CartLineResponse>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}
