//! Room Orchestrator: the per-consultation state machine.
//!
//! ```text
//!   create ──► Pending ──(first join or message)──► Active
//!                 │                                   │
//!          pending_ttl lapses             end(actor) / inactivity lapses
//!                 ▼                                   ▼
//!             AutoEnded                        Ended / AutoEnded
//! ```
//!
//! The orchestrator mediates between the edge and the collaborators. The
//! transcript store decides every state transition; the registry only
//! carries the resulting frames. Writes that are broadcast run under the
//! consultation's [`Sequencer`] guard so frames leave in commit order.
//! Room joins re-read the session under the guard, and artifact issuance
//! holds it from the attach check through upload and attach.

pub mod sequencer;

use crate::actors::{FrameSink, JoinTicket, JoinToken, RegistryHandle};
use crate::artifacts::{
    parse_age, parse_date, ArtifactDocument, ArtifactService, CertificateInput,
    PrescriptionInput, PrescriptionLine, MAX_DIAGNOSIS_CHARS, MAX_PRESCRIPTION_ITEMS,
};
use crate::config::RoomSettings;
use crate::errors::ConsultationError;
use crate::models::api::{
    CertificateRequest, CreateConsultationRequest, ListConsultationsQuery, PrescriptionRequest,
};
use crate::models::{
    Actor, ArtifactAttachment, ArtifactKind, Consultation, ConsultationId, EndOutcome,
    ListFilter, Message, MessageKind, NewConsultation, Page, Patient, Principal, PrescriptionItem,
    RoomFrame, SessionState, Side, StatusFilter, Transcript,
};
use crate::observability::metrics;
use crate::services::blob_store::sanitize_file_name;
use crate::services::{BlobStore, Cart, CartLine, Catalog};
use crate::tasks::{start_deadline_worker, DeadlineHandle};
use crate::transcript::TranscriptStore;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sequencer::Sequencer;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Default page size of consultation listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Largest accepted page size.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Longest accepted chat message.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Longest accepted patient name.
pub const MAX_PATIENT_NAME_CHARS: usize = 120;

/// Registry close reason once a session has ended.
const CLOSE_REASON_ENDED: &str = "ended";

/// Durable and external collaborators.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn TranscriptStore>,
    pub blob_store: Arc<dyn BlobStore>,
    pub catalog: Arc<dyn Catalog>,
    pub cart: Arc<dyn Cart>,
}

/// One cart line produced by a prescription conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertedLine {
    pub pharmacy_product_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub price: i64,
}

/// Result of `AddPrescriptionToCart`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartConversion {
    pub pharmacy_id: i64,
    pub lines: Vec<ConvertedLine>,
}

pub struct RoomOrchestrator {
    store: Arc<dyn TranscriptStore>,
    blob_store: Arc<dyn BlobStore>,
    catalog: Arc<dyn Catalog>,
    cart: Arc<dyn Cart>,
    artifacts: ArtifactService,
    registry: RegistryHandle,
    deadlines: DeadlineHandle,
    settings: RoomSettings,
    max_upload_bytes: usize,
    sequencer: Sequencer,
}

impl RoomOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        registry: RegistryHandle,
        deadlines: DeadlineHandle,
        settings: RoomSettings,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            artifacts: ArtifactService::new(Arc::clone(&collaborators.blob_store)),
            store: collaborators.store,
            blob_store: collaborators.blob_store,
            catalog: collaborators.catalog,
            cart: collaborators.cart,
            registry,
            deadlines,
            settings,
            max_upload_bytes,
            sequencer: Sequencer::new(),
        }
    }

    /// Spawn the registry, the deadline scheduler and its worker, all
    /// children of `cancel_token`.
    pub fn start(
        collaborators: Collaborators,
        settings: RoomSettings,
        max_upload_bytes: usize,
        cancel_token: &CancellationToken,
    ) -> Arc<Self> {
        let registry = RegistryHandle::spawn(&settings, cancel_token.child_token());
        let (deadlines, expired) = DeadlineHandle::spawn(cancel_token.child_token());

        let orchestrator = Arc::new(Self::new(
            collaborators,
            registry,
            deadlines,
            settings,
            max_upload_bytes,
        ));
        tokio::spawn(start_deadline_worker(
            Arc::clone(&orchestrator),
            expired,
            cancel_token.child_token(),
        ));
        orchestrator
    }

    pub fn store(&self) -> &Arc<dyn TranscriptStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create a consultation for the calling user and arm its pending TTL.
    #[instrument(skip_all, name = "cs.orchestrator.create", fields(doctor_id = request.doctor_id))]
    pub async fn create(
        &self,
        principal: &Principal,
        request: CreateConsultationRequest,
    ) -> Result<Consultation, ConsultationError> {
        if principal.side()? != Side::User {
            return Err(ConsultationError::Forbidden(
                "Only users can open consultations".to_string(),
            ));
        }
        let input = validate_new_consultation(principal.id, request)?;

        let consultation = self.store.create_consultation(input).await?;
        self.arm(consultation.id, self.settings.pending_ttl).await;

        info!(
            target: "cs.orchestrator",
            consultation_id = consultation.id,
            doctor_id = consultation.doctor_id,
            "Consultation created"
        );
        Ok(consultation)
    }

    /// List the caller's consultations.
    #[instrument(skip_all, name = "cs.orchestrator.list")]
    pub async fn list(
        &self,
        principal: &Principal,
        query: ListConsultationsQuery,
    ) -> Result<Page<Consultation>, ConsultationError> {
        let side = principal.side()?;
        let filter = list_filter(query)?;
        self.store.list_for_actor(side, principal.id, filter).await
    }

    /// Full transcript, participants only.
    #[instrument(skip_all, name = "cs.orchestrator.load_transcript", fields(consultation_id = id))]
    pub async fn load_transcript(
        &self,
        principal: &Principal,
        id: ConsultationId,
    ) -> Result<Transcript, ConsultationError> {
        let transcript = self.store.load_transcript(id).await?;
        participant_side(&transcript.consultation, principal)?;
        Ok(transcript)
    }

    /// End the session on behalf of a participant. Idempotent.
    #[instrument(skip_all, name = "cs.orchestrator.end_session", fields(consultation_id = id))]
    pub async fn end_session(
        &self,
        principal: &Principal,
        id: ConsultationId,
    ) -> Result<EndOutcome, ConsultationError> {
        let actor = Actor::Participant {
            side: principal.side()?,
            id: principal.id,
        };
        let _guard = self.sequencer.lock(id).await;
        self.end_locked(id, actor).await
    }

    /// Store end, then `session-ended` to the room, then close the room.
    /// Caller holds the sequencer guard.
    async fn end_locked(
        &self,
        id: ConsultationId,
        actor: Actor,
    ) -> Result<EndOutcome, ConsultationError> {
        let outcome = self.store.end_session(id, actor).await?;

        if let Some(closing) = &outcome.closing_message {
            self.broadcast(id, RoomFrame::from(closing)).await;
            info!(
                target: "cs.orchestrator",
                consultation_id = id,
                ended_by = actor.ended_by().as_str(),
                "Consultation ended"
            );
        }
        if let Err(e) = self.registry.close(id, CLOSE_REASON_ENDED).await {
            warn!(target: "cs.orchestrator", consultation_id = id, error = %e, "Room close failed");
        }
        if let Err(e) = self.deadlines.disarm(id).await {
            warn!(target: "cs.orchestrator", consultation_id = id, error = %e, "Deadline disarm failed");
        }
        Ok(outcome)
    }

    /// Called when a consultation's timer fires. Ends the session only if
    /// it is still open and actually overdue; otherwise re-arms for the
    /// time left.
    #[instrument(skip_all, name = "cs.orchestrator.handle_deadline", fields(consultation_id = id))]
    pub async fn handle_deadline(&self, id: ConsultationId) -> Result<(), ConsultationError> {
        let _guard = self.sequencer.lock(id).await;

        let consultation = match self.store.get_consultation(id).await {
            Ok(c) => c,
            Err(ConsultationError::NotFound(_)) => {
                metrics::record_deadline_fired("skipped");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if consultation.state().is_terminal() {
            metrics::record_deadline_fired("skipped");
            return Ok(());
        }

        let remaining = self.time_left(&consultation, Utc::now());
        if remaining.is_zero() {
            self.end_locked(id, Actor::System).await?;
            metrics::record_deadline_fired("ended");
        } else {
            debug!(
                target: "cs.orchestrator",
                consultation_id = id,
                remaining_ms = remaining.as_millis() as u64,
                "Deadline not yet due, re-arming"
            );
            self.arm(id, remaining).await;
            metrics::record_deadline_fired("rearmed");
        }
        Ok(())
    }

    /// Arm timers for every open consultation. Run once at start-up.
    #[instrument(skip_all, name = "cs.orchestrator.rearm_open_sessions")]
    pub async fn rearm_open_sessions(&self) -> Result<usize, ConsultationError> {
        let open = self.store.list_open().await?;
        let now = Utc::now();
        for consultation in &open {
            self.arm(consultation.id, self.time_left(consultation, now))
                .await;
        }
        info!(target: "cs.orchestrator", count = open.len(), "Re-armed session deadlines");
        Ok(open.len())
    }

    /// Time until the consultation is due to auto-end, zero when overdue.
    fn time_left(&self, consultation: &Consultation, now: DateTime<Utc>) -> Duration {
        let (reference, budget) = match consultation.state() {
            SessionState::Pending => (consultation.created_at, self.settings.pending_ttl),
            _ => (
                consultation.last_activity(),
                self.settings.inactivity_deadline,
            ),
        };
        let elapsed = (now - reference).to_std().unwrap_or(Duration::ZERO);
        budget.saturating_sub(elapsed)
    }

    async fn arm(&self, id: ConsultationId, after: Duration) {
        if let Err(e) = self.deadlines.arm(id, after).await {
            warn!(target: "cs.orchestrator", consultation_id = id, error = %e, "Deadline arm failed");
        }
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Append a text message sent over HTTP or the room socket.
    #[instrument(skip_all, name = "cs.orchestrator.send_message", fields(consultation_id = id))]
    pub async fn send_message(
        &self,
        principal: &Principal,
        id: ConsultationId,
        kind: &str,
        content: &str,
    ) -> Result<Message, ConsultationError> {
        let kind: MessageKind = kind.parse()?;
        if kind != MessageKind::Text {
            return Err(ConsultationError::Validation(
                "Only text messages can be sent directly; upload files via chats/file".to_string(),
            ));
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(ConsultationError::Validation(
                "content must not be empty".to_string(),
            ));
        }
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ConsultationError::Validation(format!(
                "content must be at most {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let consultation = self.store.get_consultation(id).await?;
        let side = writable_side(&consultation, principal)?;
        self.append(id, side, kind, content).await
    }

    /// Upload a file to the blob store and append it as an image or file
    /// message carrying the URL.
    #[instrument(
        skip_all,
        name = "cs.orchestrator.upload_and_send",
        fields(consultation_id = id, size = body.len())
    )]
    pub async fn upload_and_send(
        &self,
        principal: &Principal,
        id: ConsultationId,
        file_name: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<Message, ConsultationError> {
        if body.is_empty() {
            return Err(ConsultationError::Validation(
                "Uploaded file is empty".to_string(),
            ));
        }
        if body.len() > self.max_upload_bytes {
            return Err(ConsultationError::Validation(format!(
                "Uploaded file exceeds {} bytes",
                self.max_upload_bytes
            )));
        }

        // Check before uploading so a closed session leaves no orphan object.
        let consultation = self.store.get_consultation(id).await?;
        let side = writable_side(&consultation, principal)?;

        let kind = if content_type.starts_with("image/") {
            MessageKind::Image
        } else {
            MessageKind::File
        };
        let key = format!(
            "chats/{id}/{}-{}",
            Uuid::new_v4(),
            sanitize_file_name(file_name)
        );
        let url = self.blob_store.put(&key, content_type, body).await?;

        self.append(id, side, kind, &url).await
    }

    /// Store, broadcast, re-arm the inactivity deadline.
    async fn append(
        &self,
        id: ConsultationId,
        side: Side,
        kind: MessageKind,
        content: &str,
    ) -> Result<Message, ConsultationError> {
        let _guard = self.sequencer.lock(id).await;
        let message = self.store.append_message(id, side, kind, content).await?;
        self.broadcast(id, RoomFrame::from(&message)).await;
        self.arm(id, self.settings.inactivity_deadline).await;

        debug!(
            target: "cs.orchestrator",
            consultation_id = id,
            ordinal = message.ordinal,
            kind = kind.as_str(),
            "Message appended"
        );
        Ok(message)
    }

    /// Delivery failure never fails the caller; the transcript is authoritative.
    async fn broadcast(&self, id: ConsultationId, frame: RoomFrame) {
        if let Err(e) = self.registry.broadcast(id, frame).await {
            warn!(target: "cs.orchestrator", consultation_id = id, error = %e, "Broadcast failed");
        }
    }

    // ------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------

    /// Check a room join before the socket is upgraded.
    pub async fn admit(
        &self,
        principal: &Principal,
        id: ConsultationId,
    ) -> Result<(Consultation, Side), ConsultationError> {
        let consultation = self.store.get_consultation(id).await?;
        let side = participant_side(&consultation, principal)?;
        if consultation.state().is_terminal() {
            return Err(ConsultationError::AlreadyEnded);
        }
        Ok((consultation, side))
    }

    /// Admit a participant's socket. Activates a pending session.
    #[instrument(skip_all, name = "cs.orchestrator.join_room", fields(consultation_id = id))]
    pub async fn join_room(
        &self,
        principal: &Principal,
        id: ConsultationId,
        sink: Box<dyn FrameSink>,
    ) -> Result<JoinTicket, ConsultationError> {
        let (_, side) = self.admit(principal, id).await?;

        // An end may commit between admission and the guard; re-read so a
        // room is never opened for an ended session.
        let _guard = self.sequencer.lock(id).await;
        let consultation = self.store.get_consultation(id).await?;
        match consultation.state() {
            SessionState::Ended | SessionState::AutoEnded => {
                return Err(ConsultationError::AlreadyEnded)
            }
            SessionState::Pending => {
                self.store.activate(id).await.map_err(|e| match e {
                    ConsultationError::SessionEnded => ConsultationError::AlreadyEnded,
                    other => other,
                })?;
                self.arm(id, self.settings.inactivity_deadline).await;
                info!(target: "cs.orchestrator", consultation_id = id, "Consultation activated");
            }
            SessionState::Active => {}
        }

        let ticket = self.registry.join(id, side, sink).await?;
        info!(
            target: "cs.orchestrator",
            consultation_id = id,
            side = %side,
            connection_id = ticket.token.connection_id,
            "Participant joined room"
        );
        Ok(ticket)
    }

    /// Socket closed on the client's side.
    pub async fn leave_room(&self, token: JoinToken) -> Result<(), ConsultationError> {
        self.registry.leave(token).await
    }

    /// Inbound socket activity.
    pub async fn touch(&self, token: JoinToken) -> Result<(), ConsultationError> {
        self.registry.touch(token).await
    }

    // ------------------------------------------------------------------
    // Artifacts
    // ------------------------------------------------------------------

    /// Render, upload and attach a medical certificate.
    #[instrument(skip_all, name = "cs.orchestrator.create_certificate", fields(consultation_id = id))]
    pub async fn create_certificate(
        &self,
        principal: &Principal,
        id: ConsultationId,
        request: CertificateRequest,
    ) -> Result<String, ConsultationError> {
        let start = parse_date("start_date", &request.start_date)?;
        let end = parse_date("end_date", &request.end_date)?;
        if start > end {
            return Err(ConsultationError::Validation(
                "start_date must not be after end_date".to_string(),
            ));
        }
        let diagnosis = request.diagnosis.trim();
        if diagnosis.is_empty() {
            return Err(ConsultationError::Validation(
                "diagnosis must not be empty".to_string(),
            ));
        }
        if diagnosis.chars().count() > MAX_DIAGNOSIS_CHARS {
            return Err(ConsultationError::Validation(format!(
                "diagnosis must be at most {MAX_DIAGNOSIS_CHARS} characters"
            )));
        }
        let age = parse_age(request.patient_age)?;

        // Held through upload and attach so only one request writes the key.
        let _guard = self.sequencer.lock(id).await;
        let consultation = self.artifact_target(principal, id, ArtifactKind::Certificate).await?;
        let doctor_name = self.doctor_name(consultation.doctor_id).await?;

        let document = ArtifactDocument::Certificate(CertificateInput {
            patient: consultation.patient.clone(),
            diagnosis: diagnosis.to_string(),
            start,
            end,
            age,
            doctor_name,
        });
        let url = self.artifacts.publish(id, document).await?;

        self.attach_locked(id, ArtifactKind::Certificate, url, Vec::new())
            .await
    }

    /// Render, upload and attach a prescription with its items.
    #[instrument(skip_all, name = "cs.orchestrator.create_prescription", fields(consultation_id = id))]
    pub async fn create_prescription(
        &self,
        principal: &Principal,
        id: ConsultationId,
        request: PrescriptionRequest,
    ) -> Result<String, ConsultationError> {
        let items = validate_prescription(&request)?;
        let age = parse_age(request.patient_age)?;

        let _guard = self.sequencer.lock(id).await;
        let consultation = self.artifact_target(principal, id, ArtifactKind::Prescription).await?;

        let product_ids: Vec<i64> = items.iter().map(|i| i.product_id).collect();
        let products = self.catalog.products(&product_ids).await?;
        let mut lines = Vec::with_capacity(items.len());
        for item in &items {
            let product = products
                .iter()
                .find(|p| p.id == item.product_id)
                .ok_or_else(|| {
                    ConsultationError::Validation(format!("Unknown product {}", item.product_id))
                })?;
            lines.push(PrescriptionLine {
                product_name: product.name.clone(),
                quantity: item.quantity,
                unit: product.unit.clone(),
            });
        }

        let doctor_name = self.doctor_name(consultation.doctor_id).await?;
        let document = ArtifactDocument::Prescription(PrescriptionInput {
            patient: consultation.patient.clone(),
            age,
            doctor_name,
            lines,
        });
        let url = self.artifacts.publish(id, document).await?;

        self.attach_locked(id, ArtifactKind::Prescription, url, items)
            .await
    }

    /// Doctor of an active consultation without this artifact yet.
    async fn artifact_target(
        &self,
        principal: &Principal,
        id: ConsultationId,
        kind: ArtifactKind,
    ) -> Result<Consultation, ConsultationError> {
        let consultation = self.store.get_consultation(id).await?;
        if participant_side(&consultation, principal)? != Side::Doctor {
            return Err(ConsultationError::Forbidden(
                "Only the consultation's doctor can issue artifacts".to_string(),
            ));
        }
        match consultation.state() {
            SessionState::Pending => return Err(ConsultationError::SessionNotActive),
            SessionState::Ended | SessionState::AutoEnded => {
                return Err(ConsultationError::SessionEnded)
            }
            SessionState::Active => {}
        }
        let existing = match kind {
            ArtifactKind::Certificate => &consultation.certificate_url,
            ArtifactKind::Prescription => &consultation.prescription_url,
        };
        if existing.is_some() {
            return Err(ConsultationError::AlreadyAttached(format!(
                "A {} is already attached to consultation {id}",
                kind.as_str()
            )));
        }
        Ok(consultation)
    }

    async fn doctor_name(&self, doctor_id: i64) -> Result<String, ConsultationError> {
        self.store
            .get_doctor(doctor_id)
            .await?
            .map(|d| d.name)
            .ok_or_else(|| ConsultationError::NotFound(format!("Doctor {doctor_id} not found")))
    }

    /// Caller holds the sequencer guard.
    async fn attach_locked(
        &self,
        id: ConsultationId,
        kind: ArtifactKind,
        url: String,
        items: Vec<PrescriptionItem>,
    ) -> Result<String, ConsultationError> {
        let outcome = self
            .store
            .attach_artifact(id, ArtifactAttachment { kind, url, items })
            .await?;
        self.broadcast(id, RoomFrame::from(&outcome.message)).await;
        self.arm(id, self.settings.inactivity_deadline).await;

        info!(
            target: "cs.orchestrator",
            consultation_id = id,
            kind = kind.as_str(),
            "Artifact attached"
        );
        Ok(outcome.message.content)
    }

    // ------------------------------------------------------------------
    // Cart
    // ------------------------------------------------------------------

    /// Convert the attached prescription into cart lines at one pharmacy.
    /// All or nothing.
    #[instrument(
        skip_all,
        name = "cs.orchestrator.add_prescription_to_cart",
        fields(consultation_id = id, pharmacy_id = pharmacy_id)
    )]
    pub async fn add_prescription_to_cart(
        &self,
        principal: &Principal,
        id: ConsultationId,
        pharmacy_id: i64,
    ) -> Result<CartConversion, ConsultationError> {
        if pharmacy_id <= 0 {
            return Err(ConsultationError::Validation(
                "pharmacy_id must be a positive integer".to_string(),
            ));
        }
        let consultation = self.store.get_consultation(id).await?;
        if participant_side(&consultation, principal)? != Side::User {
            return Err(ConsultationError::Forbidden(
                "Only the consultation's user can add the prescription to a cart".to_string(),
            ));
        }
        if consultation.prescription_items.is_empty() {
            return Err(ConsultationError::NotFound(
                "No prescription is attached to this consultation".to_string(),
            ));
        }

        let result = self.convert(&consultation, pharmacy_id).await;
        let status = match &result {
            Ok(_) => "success",
            Err(ConsultationError::NotEnoughStock(_)) => "not_enough_stock",
            Err(_) => "error",
        };
        metrics::record_cart_conversion(status);
        result
    }

    async fn convert(
        &self,
        consultation: &Consultation,
        pharmacy_id: i64,
    ) -> Result<CartConversion, ConsultationError> {
        let product_ids: Vec<i64> = consultation
            .prescription_items
            .iter()
            .map(|i| i.product_id)
            .collect();
        let offers = self.catalog.resolve(pharmacy_id, &product_ids).await?;

        let mut lines = Vec::with_capacity(consultation.prescription_items.len());
        for item in &consultation.prescription_items {
            let offer = offers
                .iter()
                .find(|o| o.product_id == item.product_id)
                .ok_or_else(|| {
                    ConsultationError::NotEnoughStock(format!(
                        "Product {} is not available at pharmacy {pharmacy_id}",
                        item.product_id
                    ))
                })?;
            lines.push(ConvertedLine {
                pharmacy_product_id: offer.id,
                product_id: item.product_id,
                quantity: item.quantity,
                price: offer.price,
            });
        }

        let cart_lines: Vec<CartLine> = lines
            .iter()
            .map(|l| CartLine {
                pharmacy_product_id: l.pharmacy_product_id,
                quantity: l.quantity,
            })
            .collect();
        self.cart
            .add_many(consultation.user_id, &cart_lines)
            .await?;

        info!(
            target: "cs.orchestrator",
            consultation_id = consultation.id,
            lines = lines.len(),
            "Prescription added to cart"
        );
        Ok(CartConversion { pharmacy_id, lines })
    }
}

/// Side of the principal, `Forbidden` for non-participants.
fn participant_side(
    consultation: &Consultation,
    principal: &Principal,
) -> Result<Side, ConsultationError> {
    consultation.side_of(principal).ok_or_else(|| {
        ConsultationError::Forbidden("You are not a participant of this consultation".to_string())
    })
}

/// Participant side of a consultation that still accepts writes.
fn writable_side(
    consultation: &Consultation,
    principal: &Principal,
) -> Result<Side, ConsultationError> {
    let side = participant_side(consultation, principal)?;
    if consultation.state().is_terminal() {
        return Err(ConsultationError::SessionEnded);
    }
    Ok(side)
}

fn validate_new_consultation(
    user_id: i64,
    request: CreateConsultationRequest,
) -> Result<NewConsultation, ConsultationError> {
    if request.doctor_id <= 0 {
        return Err(ConsultationError::Validation(
            "doctor_id must be a positive integer".to_string(),
        ));
    }
    let name = request.patient_name.trim();
    if name.is_empty() {
        return Err(ConsultationError::Validation(
            "patient_name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_PATIENT_NAME_CHARS {
        return Err(ConsultationError::Validation(format!(
            "patient_name must be at most {MAX_PATIENT_NAME_CHARS} characters"
        )));
    }
    if !matches!(request.patient_gender_id, 1 | 2) {
        return Err(ConsultationError::Validation(
            "patient_gender_id must be 1 or 2".to_string(),
        ));
    }
    let birth_date = parse_date("patient_birth_date", &request.patient_birth_date)?;
    if birth_date > Utc::now().date_naive() {
        return Err(ConsultationError::Validation(
            "patient_birth_date must not be in the future".to_string(),
        ));
    }

    Ok(NewConsultation {
        doctor_id: request.doctor_id,
        user_id,
        patient: Patient {
            name: name.to_string(),
            birth_date,
            gender_id: request.patient_gender_id,
        },
    })
}

fn list_filter(query: ListConsultationsQuery) -> Result<ListFilter, ConsultationError> {
    let status = match query.status.as_deref() {
        None | Some("") => StatusFilter::All,
        Some(value) => value.parse()?,
    };
    let page = query.page.unwrap_or(1);
    if page == 0 {
        return Err(ConsultationError::Validation(
            "page must be at least 1".to_string(),
        ));
    }
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(ConsultationError::Validation(format!(
            "limit must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }
    Ok(ListFilter {
        status,
        page,
        limit,
    })
}

fn validate_prescription(
    request: &PrescriptionRequest,
) -> Result<Vec<PrescriptionItem>, ConsultationError> {
    if request.products.is_empty() {
        return Err(ConsultationError::Validation(
            "products must not be empty".to_string(),
        ));
    }
    if request.products.len() > MAX_PRESCRIPTION_ITEMS {
        return Err(ConsultationError::Validation(format!(
            "a prescription holds at most {MAX_PRESCRIPTION_ITEMS} products"
        )));
    }
    if request.products.len() != request.quantities.len() {
        return Err(ConsultationError::Validation(
            "products and quantities must have the same length".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    request
        .products
        .iter()
        .zip(&request.quantities)
        .map(|(&product_id, &quantity)| {
            if !seen.insert(product_id) {
                return Err(ConsultationError::Validation(format!(
                    "product {product_id} is listed more than once"
                )));
            }
            if quantity <= 0 {
                return Err(ConsultationError::Validation(format!(
                    "quantity for product {product_id} must be positive"
                )));
            }
            Ok(PrescriptionItem {
                product_id,
                quantity,
            })
        })
        .collect()
}
