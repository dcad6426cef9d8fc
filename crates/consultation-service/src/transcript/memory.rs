//! In-memory transcript store.
//!
//! Enforces the same invariants as the Postgres store behind one async
//! mutex, which plays the role of the row lock. Used by unit tests and by
//! the test harness.

use super::TranscriptStore;
use crate::errors::ConsultationError;
use crate::models::{
    Actor, ArtifactAttachment, ArtifactKind, AttachOutcome, Consultation, ConsultationId, Doctor,
    EndOutcome, ListFilter, Message, MessageKind, NewConsultation, Page, Side, Transcript,
    SESSION_ENDED,
};
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    doctors: HashMap<i64, Doctor>,
    consultations: BTreeMap<ConsultationId, Consultation>,
    messages: HashMap<ConsultationId, Vec<Message>>,
    next_consultation_id: i64,
    next_message_id: i64,
}

impl State {
    fn consultation_mut(
        &mut self,
        id: ConsultationId,
    ) -> Result<&mut Consultation, ConsultationError> {
        self.consultations
            .get_mut(&id)
            .ok_or_else(|| ConsultationError::NotFound(format!("Consultation {id} not found")))
    }

    /// Allocate the next timestamp, strictly after the last message.
    fn next_stamp(consultation: &Consultation) -> DateTime<Utc> {
        let now = Utc::now();
        match consultation.last_message_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        }
    }

    fn push_message(
        &mut self,
        id: ConsultationId,
        sender_side: Option<Side>,
        kind: MessageKind,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Message {
        self.next_message_id += 1;
        let log = self.messages.entry(id).or_default();
        let ordinal = i64::try_from(log.len()).unwrap_or(i64::MAX - 1) + 1;
        let message = Message {
            id: self.next_message_id,
            consultation_id: id,
            ordinal,
            sender_side,
            kind,
            content: content.to_string(),
            created_at,
        };
        log.push(message.clone());
        message
    }
}

/// Transcript store held in process memory.
#[derive(Default)]
pub struct InMemoryTranscriptStore {
    state: Mutex<State>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a doctor record.
    pub async fn insert_doctor(&self, id: i64, name: &str, is_verified: bool) {
        let mut state = self.state.lock().await;
        state.doctors.insert(
            id,
            Doctor {
                id,
                name: name.to_string(),
                is_verified,
            },
        );
    }

    /// Shift every timestamp of a consultation into the past.
    ///
    /// Lets tests exercise deadline checks without waiting.
    pub async fn backdate(&self, id: ConsultationId, by: Duration) {
        let mut state = self.state.lock().await;
        if let Some(c) = state.consultations.get_mut(&id) {
            c.created_at -= by;
            c.activated_at = c.activated_at.map(|t| t - by);
            c.last_message_at = c.last_message_at.map(|t| t - by);
        }
        if let Some(log) = state.messages.get_mut(&id) {
            for message in log.iter_mut() {
                message.created_at -= by;
            }
        }
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn get_doctor(&self, doctor_id: i64) -> Result<Option<Doctor>, ConsultationError> {
        Ok(self.state.lock().await.doctors.get(&doctor_id).cloned())
    }

    async fn create_consultation(
        &self,
        input: NewConsultation,
    ) -> Result<Consultation, ConsultationError> {
        let mut state = self.state.lock().await;

        let doctor = state.doctors.get(&input.doctor_id).ok_or_else(|| {
            ConsultationError::NotFound(format!("Doctor {} not found", input.doctor_id))
        })?;
        if !doctor.is_verified {
            return Err(ConsultationError::DoctorNotVerified);
        }

        let duplicate = state.consultations.values().any(|c| {
            c.user_id == input.user_id && c.doctor_id == input.doctor_id && c.ended_at.is_none()
        });
        if duplicate {
            return Err(ConsultationError::ActiveSessionExists);
        }

        state.next_consultation_id += 1;
        let consultation = Consultation {
            id: state.next_consultation_id,
            doctor_id: input.doctor_id,
            user_id: input.user_id,
            patient: input.patient,
            created_at: Utc::now(),
            activated_at: None,
            last_message_at: None,
            ended_at: None,
            ended_by: None,
            certificate_url: None,
            prescription_url: None,
            prescription_items: Vec::new(),
        };
        state
            .consultations
            .insert(consultation.id, consultation.clone());
        Ok(consultation)
    }

    async fn get_consultation(
        &self,
        id: ConsultationId,
    ) -> Result<Consultation, ConsultationError> {
        let mut state = self.state.lock().await;
        state.consultation_mut(id).map(|c| c.clone())
    }

    async fn activate(&self, id: ConsultationId) -> Result<Consultation, ConsultationError> {
        let mut state = self.state.lock().await;
        let consultation = state.consultation_mut(id)?;
        if consultation.ended_at.is_some() {
            return Err(ConsultationError::SessionEnded);
        }
        if consultation.activated_at.is_none() {
            consultation.activated_at = Some(Utc::now());
        }
        Ok(consultation.clone())
    }

    async fn append_message(
        &self,
        id: ConsultationId,
        side: Side,
        kind: MessageKind,
        content: &str,
    ) -> Result<Message, ConsultationError> {
        let mut state = self.state.lock().await;
        let consultation = state.consultation_mut(id)?;
        if consultation.ended_at.is_some() {
            return Err(ConsultationError::SessionEnded);
        }

        let stamp = State::next_stamp(consultation);
        consultation.last_message_at = Some(stamp);
        if consultation.activated_at.is_none() {
            consultation.activated_at = Some(stamp);
        }

        let message = state.push_message(id, Some(side), kind, content, stamp);
        metrics::record_message_appended(kind.as_str());
        Ok(message)
    }

    async fn end_session(
        &self,
        id: ConsultationId,
        actor: Actor,
    ) -> Result<EndOutcome, ConsultationError> {
        let mut state = self.state.lock().await;
        let consultation = state.consultation_mut(id)?;
        if !consultation.admits(&actor) {
            return Err(ConsultationError::Forbidden(
                "Only participants can end a consultation".to_string(),
            ));
        }
        if let Some(ended_at) = consultation.ended_at {
            return Ok(EndOutcome {
                ended_at,
                closing_message: None,
            });
        }

        let ended_at = State::next_stamp(consultation);
        let ended_by = actor.ended_by();
        consultation.ended_at = Some(ended_at);
        consultation.ended_by = Some(ended_by);

        let message = state.push_message(id, None, MessageKind::System, SESSION_ENDED, ended_at);
        metrics::record_session_ended(ended_by.as_str());

        Ok(EndOutcome {
            ended_at,
            closing_message: Some(message),
        })
    }

    async fn attach_artifact(
        &self,
        id: ConsultationId,
        attachment: ArtifactAttachment,
    ) -> Result<AttachOutcome, ConsultationError> {
        let mut state = self.state.lock().await;
        let consultation = state.consultation_mut(id)?;
        if consultation.ended_at.is_some() {
            return Err(ConsultationError::SessionEnded);
        }

        let slot = match attachment.kind {
            ArtifactKind::Certificate => &mut consultation.certificate_url,
            ArtifactKind::Prescription => &mut consultation.prescription_url,
        };
        if slot.is_some() {
            return Err(ConsultationError::AlreadyAttached(format!(
                "A {} is already attached to consultation {id}",
                attachment.kind.as_str()
            )));
        }
        *slot = Some(attachment.url.clone());
        if attachment.kind == ArtifactKind::Prescription {
            consultation.prescription_items = attachment.items;
        }

        let stamp = State::next_stamp(consultation);
        consultation.last_message_at = Some(stamp);
        let updated = consultation.clone();

        let message = state.push_message(
            id,
            Some(Side::Doctor),
            MessageKind::File,
            &attachment.url,
            stamp,
        );
        metrics::record_message_appended(MessageKind::File.as_str());

        Ok(AttachOutcome {
            consultation: updated,
            message,
        })
    }

    async fn load_transcript(&self, id: ConsultationId) -> Result<Transcript, ConsultationError> {
        let mut state = self.state.lock().await;
        let consultation = state.consultation_mut(id)?.clone();
        let messages = state.messages.get(&id).cloned().unwrap_or_default();
        Ok(Transcript {
            consultation,
            messages,
        })
    }

    async fn list_for_actor(
        &self,
        side: Side,
        actor_id: i64,
        filter: ListFilter,
    ) -> Result<Page<Consultation>, ConsultationError> {
        let state = self.state.lock().await;
        let mut matching: Vec<&Consultation> = state
            .consultations
            .values()
            .filter(|c| match side {
                Side::User => c.user_id == actor_id,
                Side::Doctor => c.doctor_id == actor_id,
            })
            .filter(|c| filter.status.matches(c))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = i64::try_from(matching.len()).unwrap_or(i64::MAX);
        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(filter.limit).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok(Page {
            items,
            page: filter.page,
            limit: filter.limit,
            total,
        })
    }

    async fn list_open(&self) -> Result<Vec<Consultation>, ConsultationError> {
        let state = self.state.lock().await;
        Ok(state
            .consultations
            .values()
            .filter(|c| c.ended_at.is_none())
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), ConsultationError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{Patient, PrescriptionItem, SessionState, StatusFilter};
    use chrono::NaiveDate;
    use std::sync::Arc;

    const USER: i64 = 3;
    const DOCTOR: i64 = 7;

    fn new_consultation(user_id: i64) -> NewConsultation {
        NewConsultation {
            doctor_id: DOCTOR,
            user_id,
            patient: Patient {
                name: "Ana".to_string(),
                birth_date: NaiveDate::from_ymd_opt(1990, 4, 2).unwrap(),
                gender_id: 1,
            },
        }
    }

    async fn store() -> InMemoryTranscriptStore {
        let store = InMemoryTranscriptStore::new();
        store.insert_doctor(DOCTOR, "Dr. Budi", true).await;
        store.insert_doctor(8, "Dr. Unverified", false).await;
        store
    }

    fn doctor() -> Actor {
        Actor::Participant {
            side: Side::Doctor,
            id: DOCTOR,
        }
    }

    #[tokio::test]
    async fn test_create_then_load_is_empty() {
        let store = store().await;
        let created = store.create_consultation(new_consultation(USER)).await.unwrap();

        let transcript = store.load_transcript(created.id).await.unwrap();

        assert!(transcript.messages.is_empty());
        assert_eq!(transcript.consultation.ended_at, None);
        assert_eq!(transcript.consultation.user_id, USER);
        assert_eq!(transcript.consultation.doctor_id, DOCTOR);
        assert_eq!(transcript.consultation.state(), SessionState::Pending);
    }

    #[tokio::test]
    async fn test_create_rejects_unverified_and_unknown_doctor() {
        let store = store().await;

        let mut input = new_consultation(USER);
        input.doctor_id = 8;
        assert!(matches!(
            store.create_consultation(input).await,
            Err(ConsultationError::DoctorNotVerified)
        ));

        let mut input = new_consultation(USER);
        input.doctor_id = 99;
        assert!(matches!(
            store.create_consultation(input).await,
            Err(ConsultationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_one_active_session_per_pair() {
        let store = store().await;
        let first = store.create_consultation(new_consultation(USER)).await.unwrap();

        assert!(matches!(
            store.create_consultation(new_consultation(USER)).await,
            Err(ConsultationError::ActiveSessionExists)
        ));

        // Another user with the same doctor is fine.
        store.create_consultation(new_consultation(4)).await.unwrap();

        store.end_session(first.id, doctor()).await.unwrap();
        store.create_consultation(new_consultation(USER)).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_creates_yield_single_session() {
        let store = Arc::new(store().await);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store.create_consultation(new_consultation(USER)).await
            }));
        }

        let mut created = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_appends_are_ordered_and_strictly_increasing() {
        let store = store().await;
        let c = store.create_consultation(new_consultation(USER)).await.unwrap();

        for i in 0..5 {
            let side = if i % 2 == 0 { Side::User } else { Side::Doctor };
            store
                .append_message(c.id, side, MessageKind::Text, &format!("m{i}"))
                .await
                .unwrap();
        }

        let transcript = store.load_transcript(c.id).await.unwrap();
        let contents: Vec<&str> = transcript.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);

        let messages = &transcript.messages;
        for (a, b) in messages.iter().zip(messages.iter().skip(1)) {
            assert!(a.ordinal < b.ordinal);
            assert!(a.created_at < b.created_at);
        }
        assert_eq!(transcript.consultation.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_end_is_idempotent_and_blocks_writes() {
        let store = store().await;
        let c = store.create_consultation(new_consultation(USER)).await.unwrap();
        store
            .append_message(c.id, Side::User, MessageKind::Text, "hello")
            .await
            .unwrap();

        let first = store.end_session(c.id, doctor()).await.unwrap();
        let closing = first.closing_message.unwrap();
        assert_eq!(closing.kind, MessageKind::System);
        assert_eq!(closing.content, SESSION_ENDED);
        assert_eq!(closing.sender_side, None);
        assert_eq!(closing.created_at, first.ended_at);

        let second = store.end_session(c.id, Actor::System).await.unwrap();
        assert_eq!(second.ended_at, first.ended_at);
        assert!(second.closing_message.is_none());

        assert!(matches!(
            store
                .append_message(c.id, Side::User, MessageKind::Text, "late")
                .await,
            Err(ConsultationError::SessionEnded)
        ));
        assert!(matches!(
            store
                .attach_artifact(
                    c.id,
                    ArtifactAttachment {
                        kind: ArtifactKind::Certificate,
                        url: "https://blob/c.pdf".to_string(),
                        items: vec![],
                    }
                )
                .await,
            Err(ConsultationError::SessionEnded)
        ));

        let transcript = store.load_transcript(c.id).await.unwrap();
        assert_eq!(transcript.messages.len(), 2);
        assert_eq!(transcript.consultation.state(), SessionState::Ended);
    }

    #[tokio::test]
    async fn test_end_requires_participant() {
        let store = store().await;
        let c = store.create_consultation(new_consultation(USER)).await.unwrap();

        let stranger = Actor::Participant {
            side: Side::User,
            id: 99,
        };
        assert!(matches!(
            store.end_session(c.id, stranger).await,
            Err(ConsultationError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_attach_once_per_kind() {
        let store = store().await;
        let c = store.create_consultation(new_consultation(USER)).await.unwrap();

        let outcome = store
            .attach_artifact(
                c.id,
                ArtifactAttachment {
                    kind: ArtifactKind::Prescription,
                    url: "https://blob/p.pdf".to_string(),
                    items: vec![PrescriptionItem {
                        product_id: 55,
                        quantity: 2,
                    }],
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.message.kind, MessageKind::File);
        assert_eq!(outcome.message.sender_side, Some(Side::Doctor));
        assert_eq!(outcome.consultation.prescription_items.len(), 1);

        let again = store
            .attach_artifact(
                c.id,
                ArtifactAttachment {
                    kind: ArtifactKind::Prescription,
                    url: "https://blob/p2.pdf".to_string(),
                    items: vec![],
                },
            )
            .await;
        assert!(matches!(again, Err(ConsultationError::AlreadyAttached(_))));

        // A certificate can still be issued in the same session.
        store
            .attach_artifact(
                c.id,
                ArtifactAttachment {
                    kind: ArtifactKind::Certificate,
                    url: "https://blob/c.pdf".to_string(),
                    items: vec![],
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_for_actor_filters_and_pages() {
        let store = store().await;
        let ended = store.create_consultation(new_consultation(USER)).await.unwrap();
        store.end_session(ended.id, Actor::System).await.unwrap();
        let active = store.create_consultation(new_consultation(USER)).await.unwrap();
        store.create_consultation(new_consultation(4)).await.unwrap();

        let filter = |status, page, limit| ListFilter {
            status,
            page,
            limit,
        };

        let page = store
            .list_for_actor(Side::User, USER, filter(StatusFilter::All, 1, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.first().unwrap().id, active.id);

        let page = store
            .list_for_actor(Side::User, USER, filter(StatusFilter::Ended, 1, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items.first().unwrap().id, ended.id);

        let page = store
            .list_for_actor(Side::Doctor, DOCTOR, filter(StatusFilter::Active, 2, 1))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn test_backdate_shifts_activity() {
        let store = store().await;
        let c = store.create_consultation(new_consultation(USER)).await.unwrap();
        store
            .append_message(c.id, Side::User, MessageKind::Text, "hi")
            .await
            .unwrap();

        store.backdate(c.id, Duration::hours(1)).await;

        let after = store.get_consultation(c.id).await.unwrap();
        assert!(after.last_activity() < Utc::now() - Duration::minutes(59));
    }
}
