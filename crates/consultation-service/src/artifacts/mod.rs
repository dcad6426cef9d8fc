//! Artifact Service: certificate and prescription PDFs.
//!
//! Rendering is a pure function of the input record; [`ArtifactService`]
//! adds the upload step. The service never touches the transcript store,
//! attachment is the orchestrator's job.

pub mod pdf;

use crate::errors::ConsultationError;
use crate::models::{ArtifactKind, ConsultationId, Patient};
use crate::observability::metrics;
use crate::services::BlobStore;
use bytes::Bytes;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Oldest plausible patient age accepted on artifacts.
pub const MAX_PATIENT_AGE: i32 = 150;

/// Most items one prescription page holds.
pub const MAX_PRESCRIPTION_ITEMS: usize = 20;

/// Longest diagnosis printed on a certificate.
pub const MAX_DIAGNOSIS_CHARS: usize = 500;

/// Input to `RenderCertificate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInput {
    pub patient: Patient,
    pub diagnosis: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub age: u32,
    pub doctor_name: String,
}

impl CertificateInput {
    /// Inclusive length of the rest period.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// One prescription line as printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrescriptionLine {
    pub product_name: String,
    pub quantity: i32,
    pub unit: String,
}

/// Input to `RenderPrescription`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrescriptionInput {
    pub patient: Patient,
    pub age: u32,
    pub doctor_name: String,
    pub lines: Vec<PrescriptionLine>,
}

/// Document to render.
#[derive(Debug, Clone)]
pub enum ArtifactDocument {
    Certificate(CertificateInput),
    Prescription(PrescriptionInput),
}

impl ArtifactDocument {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactDocument::Certificate(_) => ArtifactKind::Certificate,
            ArtifactDocument::Prescription(_) => ArtifactKind::Prescription,
        }
    }
}

/// Parse an ISO `YYYY-MM-DD` date field.
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ConsultationError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        ConsultationError::Validation(format!("{field} must be a date in YYYY-MM-DD format"))
    })
}

/// Validate a patient age field.
pub fn parse_age(value: i32) -> Result<u32, ConsultationError> {
    if !(0..=MAX_PATIENT_AGE).contains(&value) {
        return Err(ConsultationError::Validation(format!(
            "patient_age must be between 0 and {MAX_PATIENT_AGE}"
        )));
    }
    u32::try_from(value)
        .map_err(|_| ConsultationError::Validation("patient_age must not be negative".to_string()))
}

/// Object key of an artifact. The blob store turns it into
/// `<base>/certificates/certificate-<id>.pdf` and similar.
pub fn artifact_key(kind: ArtifactKind, consultation_id: ConsultationId) -> String {
    match kind {
        ArtifactKind::Certificate => format!("certificates/certificate-{consultation_id}.pdf"),
        ArtifactKind::Prescription => format!("prescriptions/prescription-{consultation_id}.pdf"),
    }
}

/// Renders artifacts and uploads them to the blob store.
pub struct ArtifactService {
    blob_store: Arc<dyn BlobStore>,
}

impl ArtifactService {
    pub fn new(blob_store: Arc<dyn BlobStore>) -> Self {
        Self { blob_store }
    }

    /// Render off the async runtime. Failures surface as `Upstream`.
    #[instrument(skip_all, name = "cs.artifacts.render", fields(kind = document.kind().as_str()))]
    pub async fn render(&self, document: ArtifactDocument) -> Result<Vec<u8>, ConsultationError> {
        let rendered = tokio::task::spawn_blocking(move || match &document {
            ArtifactDocument::Certificate(input) => pdf::render_certificate(input),
            ArtifactDocument::Prescription(input) => pdf::render_prescription(input),
        })
        .await
        .map_err(|e| ConsultationError::Internal(format!("render task failed: {e}")))?;

        rendered.map_err(|e| match e {
            pdf::RenderError::Overflow => ConsultationError::Validation(
                "Document content does not fit on a single page".to_string(),
            ),
            other => {
                tracing::error!(target: "cs.artifacts", error = %other, "PDF rendering failed");
                ConsultationError::Upstream(format!("pdf renderer failed: {other}"))
            }
        })
    }

    /// Render and upload; returns the public URL.
    #[instrument(
        skip_all,
        name = "cs.artifacts.publish",
        fields(consultation_id = consultation_id, kind = document.kind().as_str())
    )]
    pub async fn publish(
        &self,
        consultation_id: ConsultationId,
        document: ArtifactDocument,
    ) -> Result<String, ConsultationError> {
        let start = Instant::now();
        let kind = document.kind();

        let result = async {
            let bytes = self.render(document).await?;
            self.blob_store
                .put(
                    &artifact_key(kind, consultation_id),
                    "application/pdf",
                    Bytes::from(bytes),
                )
                .await
        }
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_artifact(kind.as_str(), status, start.elapsed());
        if let Ok(url) = &result {
            tracing::info!(target: "cs.artifacts", url = %url, "Artifact published");
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::services::blob_store::mock::InMemoryBlobStore;

    fn certificate() -> CertificateInput {
        CertificateInput {
            patient: Patient {
                name: "Ana".to_string(),
                birth_date: NaiveDate::from_ymd_opt(1990, 4, 2).unwrap(),
                gender_id: 2,
            },
            diagnosis: "Flu".to_string(),
            start: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 12).unwrap(),
            age: 34,
            doctor_name: "Dr. Budi".to_string(),
        }
    }

    #[test]
    fn test_artifact_keys() {
        assert_eq!(
            artifact_key(ArtifactKind::Certificate, 101),
            "certificates/certificate-101.pdf"
        );
        assert_eq!(
            artifact_key(ArtifactKind::Prescription, 101),
            "prescriptions/prescription-101.pdf"
        );
    }

    #[test]
    fn test_certificate_days_inclusive() {
        assert_eq!(certificate().days(), 3);
    }

    #[test]
    fn test_parse_date_and_age() {
        assert!(parse_date("start_date", "2024-01-10").is_ok());
        assert!(matches!(
            parse_date("start_date", "10/01/2024"),
            Err(ConsultationError::Validation(_))
        ));
        assert_eq!(parse_age(34).unwrap(), 34);
        assert!(parse_age(-1).is_err());
        assert!(parse_age(151).is_err());
    }

    #[tokio::test]
    async fn test_publish_uploads_pdf_under_certificate_key() {
        let blob = Arc::new(InMemoryBlobStore::accepting("https://blob.test"));
        let service = ArtifactService::new(blob.clone());

        let url = service
            .publish(101, ArtifactDocument::Certificate(certificate()))
            .await
            .unwrap();

        assert_eq!(url, "https://blob.test/certificates/certificate-101.pdf");
        let object = blob
            .get("certificates/certificate-101.pdf")
            .await
            .unwrap();
        assert_eq!(object.content_type, "application/pdf");
        assert!(object.body.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_overflowing_document_is_validation_error_and_not_uploaded() {
        let blob = Arc::new(InMemoryBlobStore::accepting("https://blob.test"));
        let service = ArtifactService::new(blob.clone());
        let base = certificate();
        let document = ArtifactDocument::Prescription(PrescriptionInput {
            patient: base.patient,
            age: 34,
            doctor_name: base.doctor_name,
            lines: vec![
                PrescriptionLine {
                    product_name: "Paracetamol 500mg".to_string(),
                    quantity: 1,
                    unit: "strip".to_string(),
                };
                60
            ],
        });

        let result = service.publish(101, document).await;

        assert!(matches!(result, Err(ConsultationError::Validation(_))));
        assert_eq!(blob.call_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_surfaces_upload_failure() {
        let service = ArtifactService::new(Arc::new(InMemoryBlobStore::failing()));

        let result = service
            .publish(101, ArtifactDocument::Certificate(certificate()))
            .await;

        assert!(matches!(result, Err(ConsultationError::Upstream(_))));
    }
}
