//! Message types for the registry dispatcher and the outbound workers.
//!
//! Request/reply pairs carry a `oneshot` sender; fire-and-forget commands
//! do not.

use super::connection::FrameSink;
use crate::models::{ConsultationId, RoomFrame, Side};
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Identifies one registered socket handle.
///
/// `Leave`, `Touch` and failure reports only apply while the room still
/// holds the handle with this `connection_id`; a handle replaced by a
/// reconnect ignores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoinToken {
    pub consultation_id: ConsultationId,
    pub side: Side,
    pub connection_id: u64,
}

/// Result of a join: the token plus a signal that fires once the outbound
/// worker has stopped (evicted, closed, failed or shut down).
#[derive(Debug, Clone)]
pub struct JoinTicket {
    pub token: JoinToken,
    pub closed: CancellationToken,
}

/// Why a handle left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Replaced by a newer join of the same side.
    Evicted,
    /// The socket write returned an error.
    SendFailed,
    /// The socket write exceeded the outbound send deadline.
    SendTimeout,
    /// The worker queue was full at fan-out time.
    QueueFull,
    /// The worker had already stopped.
    Closed,
}

impl DropReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DropReason::Evicted => "evicted",
            DropReason::SendFailed => "send_failed",
            DropReason::SendTimeout => "send_timeout",
            DropReason::QueueFull => "queue_full",
            DropReason::Closed => "closed",
        }
    }
}

/// Commands consumed by the registry dispatcher.
pub enum RegistryMessage {
    /// Register a socket for one side of a room.
    Join {
        consultation_id: ConsultationId,
        side: Side,
        sink: Box<dyn FrameSink>,
        respond_to: oneshot::Sender<JoinTicket>,
    },

    /// The socket closed on the client's side.
    Leave { token: JoinToken },

    /// Fan a frame out to every handle of the room.
    Broadcast {
        consultation_id: ConsultationId,
        frame: RoomFrame,
    },

    /// Terminate every handle and release the room.
    Close {
        consultation_id: ConsultationId,
        reason: String,
        respond_to: oneshot::Sender<()>,
    },

    /// Reported by an outbound worker whose socket write failed.
    HandleFailed { token: JoinToken, reason: DropReason },

    /// Inbound activity on a socket.
    Touch { token: JoinToken },

    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },

    Snapshot {
        consultation_id: ConsultationId,
        respond_to: oneshot::Sender<Option<RoomSnapshot>>,
    },
}

/// Commands consumed by one outbound worker.
#[derive(Debug)]
pub enum ConnectionMessage {
    Send { frame: RoomFrame },
    Close { reason: String },
}

/// Registry-wide counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStatus {
    pub rooms: usize,
    pub connections: usize,
    pub mailbox_depth: usize,
}

/// One participant as seen by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub side: Side,
    pub connection_id: u64,
    pub joined_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Participants of one room, user side first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub consultation_id: ConsultationId,
    pub participants: Vec<ParticipantInfo>,
}

impl RoomSnapshot {
    pub fn participant(&self, side: Side) -> Option<&ParticipantInfo> {
        self.participants.iter().find(|p| p.side == side)
    }
}
