//! Transcript Store: durable, transactional access to consultations and
//! their messages.
//!
//! The store is the single source of truth. Every mutation is a conditional
//! write (`... WHERE ended_at IS NULL`) so invariants hold without advisory
//! locks:
//!
//! - `ended_at` is set once; appends and attachments after it fail with
//!   `SessionEnded`, a repeated end returns the existing timestamp
//! - at most one unended consultation per `(user_id, doctor_id)`
//! - messages carry a per-consultation ordinal and a strictly increasing
//!   `created_at`
//! - each artifact URL is written at most once
//!
//! Two implementations exist: [`PgTranscriptStore`] for production and
//! [`InMemoryTranscriptStore`] for tests and the test harness.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryTranscriptStore;
pub use postgres::PgTranscriptStore;

use crate::errors::ConsultationError;
use crate::models::{
    Actor, ArtifactAttachment, AttachOutcome, Consultation, ConsultationId, Doctor, EndOutcome,
    ListFilter, Message, MessageKind, NewConsultation, Page, Side, Transcript,
};
use async_trait::async_trait;

/// Durable accessor for consultations and transcripts.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Look up a doctor.
    async fn get_doctor(&self, doctor_id: i64) -> Result<Option<Doctor>, ConsultationError>;

    /// Create a consultation.
    ///
    /// Fails with `NotFound` (unknown doctor), `DoctorNotVerified` or
    /// `ActiveSessionExists`.
    async fn create_consultation(
        &self,
        input: NewConsultation,
    ) -> Result<Consultation, ConsultationError>;

    /// Fetch a consultation with its prescription items. `NotFound` if absent.
    async fn get_consultation(&self, id: ConsultationId)
        -> Result<Consultation, ConsultationError>;

    /// Mark a pending consultation active. No-op when already active.
    ///
    /// Fails with `SessionEnded` on a terminal consultation.
    async fn activate(&self, id: ConsultationId) -> Result<Consultation, ConsultationError>;

    /// Append a participant message, assigning the next ordinal.
    ///
    /// Activates a pending consultation. Fails with `NotFound` or `SessionEnded`.
    async fn append_message(
        &self,
        id: ConsultationId,
        side: Side,
        kind: MessageKind,
        content: &str,
    ) -> Result<Message, ConsultationError>;

    /// End the session and write the closing system message.
    ///
    /// Idempotent: a repeat returns the stored `ended_at` and no message.
    /// Fails with `Forbidden` when the actor is not a participant.
    async fn end_session(
        &self,
        id: ConsultationId,
        actor: Actor,
    ) -> Result<EndOutcome, ConsultationError>;

    /// Store an artifact URL (and prescription rows) plus the doctor's
    /// `file` message in one unit of work.
    ///
    /// Fails with `SessionEnded` or `AlreadyAttached`.
    async fn attach_artifact(
        &self,
        id: ConsultationId,
        attachment: ArtifactAttachment,
    ) -> Result<AttachOutcome, ConsultationError>;

    /// Consultation plus messages in ordinal order.
    async fn load_transcript(&self, id: ConsultationId) -> Result<Transcript, ConsultationError>;

    /// Consultations where the actor is the given side, newest first.
    async fn list_for_actor(
        &self,
        side: Side,
        actor_id: i64,
        filter: ListFilter,
    ) -> Result<Page<Consultation>, ConsultationError>;

    /// All consultations with `ended_at` unset (deadline re-arm at start-up).
    async fn list_open(&self) -> Result<Vec<Consultation>, ConsultationError>;

    /// Connectivity check for the health endpoint.
    async fn ping(&self) -> Result<(), ConsultationError>;
}
