//! Domain types for consultations, transcripts and room frames.
//!
//! Wire-facing request/response shapes live in [`api`].

pub mod api;

use crate::errors::ConsultationError;
use chrono::{DateTime, NaiveDate, Utc};
use common::types::Role;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Consultation identifier (database `BIGSERIAL`).
pub type ConsultationId = i64;

/// System frame content announcing the other side joined the room.
pub const PEER_JOINED: &str = "peer-joined";

/// System frame content announcing the other side left the room.
pub const PEER_LEFT: &str = "peer-left";

/// System frame and transcript content for a terminated session.
pub const SESSION_ENDED: &str = "session-ended";

/// A participant's role within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    User,
    Doctor,
}

impl Side {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Side::User => "user",
            Side::Doctor => "doctor",
        }
    }

    /// The other participant.
    pub const fn peer(&self) -> Side {
        match self {
            Side::User => Side::Doctor,
            Side::Doctor => Side::User,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = ConsultationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Side::User),
            "doctor" => Ok(Side::Doctor),
            other => Err(ConsultationError::Internal(format!(
                "unknown sender side '{other}'"
            ))),
        }
    }
}

/// Transcript entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    File,
    System,
}

impl MessageKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
            MessageKind::System => "system",
        }
    }
}

impl FromStr for MessageKind {
    type Err = ConsultationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "file" => Ok(MessageKind::File),
            "system" => Ok(MessageKind::System),
            other => Err(ConsultationError::Validation(format!(
                "Unsupported message type '{other}'"
            ))),
        }
    }
}

/// Who ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndedBy {
    User,
    Doctor,
    System,
}

impl EndedBy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EndedBy::User => "user",
            EndedBy::Doctor => "doctor",
            EndedBy::System => "system",
        }
    }
}

impl From<Side> for EndedBy {
    fn from(side: Side) -> Self {
        match side {
            Side::User => EndedBy::User,
            Side::Doctor => EndedBy::Doctor,
        }
    }
}

impl FromStr for EndedBy {
    type Err = ConsultationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EndedBy::User),
            "doctor" => Ok(EndedBy::Doctor),
            "system" => Ok(EndedBy::System),
            other => Err(ConsultationError::Internal(format!(
                "unknown ended_by '{other}'"
            ))),
        }
    }
}

/// Derived session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, nobody joined and nothing sent yet.
    Pending,
    Active,
    /// Ended by a participant.
    Ended,
    /// Ended by the deadline timer.
    AutoEnded,
}

impl SessionState {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended | SessionState::AutoEnded)
    }
}

/// Artifact produced by the doctor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Certificate,
    Prescription,
}

impl ArtifactKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Certificate => "certificate",
            ArtifactKind::Prescription => "prescription",
        }
    }
}

/// Authenticated caller, projected from the bearer credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: i64,
    pub role: Role,
}

impl Principal {
    /// Room side for this principal. Only users and doctors take part in rooms.
    pub fn side(&self) -> Result<Side, ConsultationError> {
        match self.role {
            Role::User => Ok(Side::User),
            Role::Doctor => Ok(Side::Doctor),
            other => Err(ConsultationError::Forbidden(format!(
                "Role '{other}' cannot take part in consultations"
            ))),
        }
    }
}

/// Who is performing a lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Participant { side: Side, id: i64 },
    System,
}

impl Actor {
    pub fn ended_by(&self) -> EndedBy {
        match self {
            Actor::Participant { side, .. } => EndedBy::from(*side),
            Actor::System => EndedBy::System,
        }
    }
}

/// Patient data captured at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub name: String,
    pub birth_date: NaiveDate,
    pub gender_id: i16,
}

/// Input to `CreateConsultation`.
#[derive(Debug, Clone)]
pub struct NewConsultation {
    pub doctor_id: i64,
    pub user_id: i64,
    pub patient: Patient,
}

/// `(product_id, quantity)` attached with a prescription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriptionItem {
    pub product_id: i64,
    pub quantity: i32,
}

/// Doctor record as seen by this service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doctor {
    pub id: i64,
    pub name: String,
    pub is_verified: bool,
}

/// The root entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Consultation {
    pub id: ConsultationId,
    pub doctor_id: i64,
    pub user_id: i64,
    pub patient: Patient,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub ended_by: Option<EndedBy>,
    pub certificate_url: Option<String>,
    pub prescription_url: Option<String>,
    pub prescription_items: Vec<PrescriptionItem>,
}

impl Consultation {
    pub fn state(&self) -> SessionState {
        match (self.ended_at, self.ended_by, self.activated_at) {
            (Some(_), Some(EndedBy::System), _) => SessionState::AutoEnded,
            (Some(_), _, _) => SessionState::Ended,
            (None, _, None) => SessionState::Pending,
            (None, _, Some(_)) => SessionState::Active,
        }
    }

    /// Side the principal plays in this consultation, if any.
    pub fn side_of(&self, principal: &Principal) -> Option<Side> {
        match principal.role {
            Role::User if principal.id == self.user_id => Some(Side::User),
            Role::Doctor if principal.id == self.doctor_id => Some(Side::Doctor),
            _ => None,
        }
    }

    /// Whether `actor` is allowed to act on this consultation.
    pub fn admits(&self, actor: &Actor) -> bool {
        match actor {
            Actor::System => true,
            Actor::Participant { side: Side::User, id } => *id == self.user_id,
            Actor::Participant { side: Side::Doctor, id } => *id == self.doctor_id,
        }
    }

    /// Reference point for the inactivity deadline.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message_at
            .or(self.activated_at)
            .unwrap_or(self.created_at)
    }
}

/// Immutable transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub consultation_id: ConsultationId,
    pub ordinal: i64,
    /// `None` for server-originated entries.
    pub sender_side: Option<Side>,
    pub kind: MessageKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A consultation together with its ordered messages.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub consultation: Consultation,
    pub messages: Vec<Message>,
}

/// Listing filter on `ended_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    Active,
    Ended,
    #[default]
    All,
}

impl StatusFilter {
    pub const fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::Active => "active",
            StatusFilter::Ended => "ended",
            StatusFilter::All => "all",
        }
    }

    pub fn matches(&self, consultation: &Consultation) -> bool {
        match self {
            StatusFilter::Active => consultation.ended_at.is_none(),
            StatusFilter::Ended => consultation.ended_at.is_some(),
            StatusFilter::All => true,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = ConsultationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(StatusFilter::Active),
            "ended" => Ok(StatusFilter::Ended),
            "all" => Ok(StatusFilter::All),
            other => Err(ConsultationError::Validation(format!(
                "status must be one of active, ended, all; got '{other}'"
            ))),
        }
    }
}

/// Paging input for `ListForActor`. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListFilter {
    pub status: StatusFilter,
    pub page: u32,
    pub limit: u32,
}

impl ListFilter {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

/// One page of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: i64,
}

/// Result of `EndSession`.
#[derive(Debug, Clone)]
pub struct EndOutcome {
    pub ended_at: DateTime<Utc>,
    /// The `session-ended` entry, present only on the call that ended the session.
    pub closing_message: Option<Message>,
}

/// Artifact attachment request.
#[derive(Debug, Clone)]
pub struct ArtifactAttachment {
    pub kind: ArtifactKind,
    pub url: String,
    pub items: Vec<PrescriptionItem>,
}

/// Result of `AttachArtifact`: the updated consultation and the doctor's file message.
#[derive(Debug, Clone)]
pub struct AttachOutcome {
    pub consultation: Consultation,
    pub message: Message,
}

/// Frame sent over a room socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomFrame {
    pub kind: MessageKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub sender_side: Option<Side>,
}

impl RoomFrame {
    /// Server-originated lifecycle frame.
    pub fn system(content: &str) -> Self {
        Self {
            kind: MessageKind::System,
            content: content.to_string(),
            created_at: Utc::now(),
            sender_side: None,
        }
    }

    pub fn is_system(&self, content: &str) -> bool {
        self.kind == MessageKind::System && self.content == content
    }
}

impl From<&Message> for RoomFrame {
    fn from(message: &Message) -> Self {
        Self {
            kind: message.kind,
            content: message.content.clone(),
            created_at: message.created_at,
            sender_side: message.sender_side,
        }
    }
}
