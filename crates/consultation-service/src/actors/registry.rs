//! Session Registry: the process-wide map `consultation_id -> Room`.
//!
//! A single dispatcher task owns every room and participant list and
//! consumes commands from a bounded queue, so room state needs no locks.
//! The dispatcher never awaits socket I/O: frames are handed to per-handle
//! outbound workers with `try_send`, and a handle that cannot keep up is
//! dropped and its peer told `peer-left`.
//!
//! Rules:
//! - one handle per side; a second join of the same side evicts the older
//!   handle (reconnect), the peer sees `peer-left` then `peer-joined`
//! - when both sides are present each is sent `peer-joined`
//! - a room left empty is released after `empty_room_grace`; this never
//!   ends the session
//! - presence is advisory, the transcript store is never consulted here

use super::connection::{ConnectionActor, ConnectionHandle, FrameSink};
use super::messages::{
    DropReason, JoinTicket, JoinToken, ParticipantInfo, RegistryMessage, RegistryStatus,
    RoomSnapshot,
};
use super::metrics::{ActorType, MailboxMonitor};
use crate::config::RoomSettings;
use crate::errors::ConsultationError;
use crate::models::{ConsultationId, RoomFrame, Side, PEER_JOINED, PEER_LEFT};
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Handle to the registry dispatcher.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl RegistryHandle {
    /// Spawn the dispatcher. Cancelling `cancel_token` stops it and closes
    /// every socket it holds.
    #[must_use]
    pub fn spawn(settings: &RoomSettings, cancel_token: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::channel(settings.dispatcher_queue_depth.max(1));
        let handle = Self {
            sender,
            cancel_token: cancel_token.clone(),
            mailbox: Arc::new(MailboxMonitor::new(ActorType::Registry, "registry")),
        };

        let actor = RegistryActor {
            receiver,
            cancel_token,
            rooms: HashMap::new(),
            next_connection_id: 0,
            settings: *settings,
            handle: handle.clone(),
        };
        tokio::spawn(actor.run());

        handle
    }

    /// Enqueue a command. Waits while the queue is full.
    async fn enqueue(&self, message: RegistryMessage) -> Result<(), ConsultationError> {
        self.mailbox.record_enqueue();
        self.sender
            .send(message)
            .await
            .map_err(|e| ConsultationError::Internal(format!("channel send failed: {e}")))
    }

    /// Register `sink` as `side` of the room.
    pub async fn join(
        &self,
        consultation_id: ConsultationId,
        side: Side,
        sink: Box<dyn FrameSink>,
    ) -> Result<JoinTicket, ConsultationError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(RegistryMessage::Join {
            consultation_id,
            side,
            sink,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| ConsultationError::Internal(format!("response receive failed: {e}")))
    }

    /// Remove the handle identified by `token`, if it is still current.
    pub async fn leave(&self, token: JoinToken) -> Result<(), ConsultationError> {
        self.enqueue(RegistryMessage::Leave { token }).await
    }

    /// Best-effort fan-out to both sides.
    pub async fn broadcast(
        &self,
        consultation_id: ConsultationId,
        frame: RoomFrame,
    ) -> Result<(), ConsultationError> {
        self.enqueue(RegistryMessage::Broadcast {
            consultation_id,
            frame,
        })
        .await
    }

    /// Terminate every handle of the room. Frames broadcast earlier are
    /// written before the sockets close.
    pub async fn close(
        &self,
        consultation_id: ConsultationId,
        reason: &str,
    ) -> Result<(), ConsultationError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(RegistryMessage::Close {
            consultation_id,
            reason: reason.to_string(),
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| ConsultationError::Internal(format!("response receive failed: {e}")))
    }

    /// Refresh `last_seen_at` of the handle.
    pub async fn touch(&self, token: JoinToken) -> Result<(), ConsultationError> {
        self.enqueue(RegistryMessage::Touch { token }).await
    }

    pub(crate) async fn report_failure(
        &self,
        token: JoinToken,
        reason: DropReason,
    ) -> Result<(), ConsultationError> {
        self.enqueue(RegistryMessage::HandleFailed { token, reason })
            .await
    }

    pub async fn status(&self) -> Result<RegistryStatus, ConsultationError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(RegistryMessage::GetStatus { respond_to: tx })
            .await?;

        rx.await
            .map_err(|e| ConsultationError::Internal(format!("response receive failed: {e}")))
    }

    /// Participants of one room, `None` when the room does not exist.
    pub async fn snapshot(
        &self,
        consultation_id: ConsultationId,
    ) -> Result<Option<RoomSnapshot>, ConsultationError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(RegistryMessage::Snapshot {
            consultation_id,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| ConsultationError::Internal(format!("response receive failed: {e}")))
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

struct Participant {
    handle: ConnectionHandle,
    joined_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

#[derive(Default)]
struct Room {
    participants: HashMap<Side, Participant>,
    empty_since: Option<Instant>,
}

/// The dispatcher.
struct RegistryActor {
    receiver: mpsc::Receiver<RegistryMessage>,
    cancel_token: CancellationToken,
    rooms: HashMap<ConsultationId, Room>,
    next_connection_id: u64,
    settings: RoomSettings,
    /// Given to outbound workers so they can report failures.
    handle: RegistryHandle,
}

/// How often empty rooms are swept.
fn sweep_period(grace: Duration) -> Duration {
    (grace / 4).clamp(Duration::from_millis(50), Duration::from_secs(30))
}

impl RegistryActor {
    #[instrument(skip_all, name = "cs.registry")]
    async fn run(mut self) {
        info!(target: "cs.registry", "Registry dispatcher started");

        let mut sweep = tokio::time::interval(sweep_period(self.settings.empty_room_grace));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "cs.registry",
                        rooms = self.rooms.len(),
                        "Registry dispatcher received cancellation"
                    );
                    break;
                }

                _ = sweep.tick() => {
                    self.release_idle_rooms();
                }

                msg = self.receiver.recv() => {
                    let Some(message) = msg else {
                        break;
                    };
                    self.handle.mailbox.record_dequeue();
                    self.handle_message(message);
                }
            }
        }

        info!(
            target: "cs.registry",
            messages_processed = self.handle.mailbox.messages_processed(),
            "Registry dispatcher stopped"
        );
    }

    fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::Join {
                consultation_id,
                side,
                sink,
                respond_to,
            } => {
                let ticket = self.join(consultation_id, side, sink);
                if respond_to.send(ticket.clone()).is_err() {
                    // Joiner went away before registration completed.
                    self.remove_participant(ticket.token, Some(DropReason::Closed));
                }
            }

            RegistryMessage::Leave { token } => {
                self.remove_participant(token, None);
            }

            RegistryMessage::Broadcast {
                consultation_id,
                frame,
            } => {
                if self.rooms.contains_key(&consultation_id) {
                    self.deliver(consultation_id, &[Side::User, Side::Doctor], &frame);
                } else {
                    debug!(
                        target: "cs.registry",
                        consultation_id = consultation_id,
                        "Broadcast to a room with no sockets"
                    );
                }
            }

            RegistryMessage::Close {
                consultation_id,
                reason,
                respond_to,
            } => {
                self.close_room(consultation_id, &reason);
                let _ = respond_to.send(());
            }

            RegistryMessage::HandleFailed { token, reason } => {
                self.remove_participant(token, Some(reason));
            }

            RegistryMessage::Touch { token } => {
                if let Some(participant) = self.current_participant_mut(token) {
                    participant.last_seen_at = Utc::now();
                }
            }

            RegistryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(RegistryStatus {
                    rooms: self.rooms.len(),
                    connections: self.connection_count(),
                    mailbox_depth: self.handle.mailbox.current_depth(),
                });
            }

            RegistryMessage::Snapshot {
                consultation_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.snapshot(consultation_id));
            }
        }
    }

    fn join(
        &mut self,
        consultation_id: ConsultationId,
        side: Side,
        sink: Box<dyn FrameSink>,
    ) -> JoinTicket {
        self.next_connection_id += 1;
        let token = JoinToken {
            consultation_id,
            side,
            connection_id: self.next_connection_id,
        };
        let connection = ConnectionActor::spawn(
            token,
            sink,
            self.settings.outbound_send_deadline,
            self.handle.clone(),
            self.cancel_token.child_token(),
        );
        let ticket = JoinTicket {
            token,
            closed: connection.closed(),
        };

        let room = self.rooms.entry(consultation_id).or_default();
        room.empty_since = None;
        let evicted = room.participants.remove(&side);
        let peer_present = room.participants.contains_key(&side.peer());

        let now = Utc::now();
        room.participants.insert(
            side,
            Participant {
                handle: connection,
                joined_at: now,
                last_seen_at: now,
            },
        );

        if let Some(previous) = evicted {
            previous.handle.close("replaced");
            metrics::record_handle_dropped(DropReason::Evicted.as_str());
            info!(
                target: "cs.registry",
                consultation_id = consultation_id,
                side = %side,
                evicted_connection_id = previous.handle.token().connection_id,
                "Older handle evicted by reconnect"
            );
            if peer_present {
                self.deliver(consultation_id, &[side.peer()], &RoomFrame::system(PEER_LEFT));
            }
        }

        if peer_present {
            self.deliver(
                consultation_id,
                &[side.peer(), side],
                &RoomFrame::system(PEER_JOINED),
            );
        }

        debug!(
            target: "cs.registry",
            consultation_id = consultation_id,
            side = %side,
            connection_id = token.connection_id,
            "Participant joined room"
        );
        self.update_gauges();
        ticket
    }

    /// Queue `frame` for the given sides; handles that refuse it are dropped.
    fn deliver(&mut self, consultation_id: ConsultationId, sides: &[Side], frame: &RoomFrame) {
        let mut failed = Vec::new();
        if let Some(room) = self.rooms.get(&consultation_id) {
            for side in sides {
                if let Some(participant) = room.participants.get(side) {
                    if let Err(reason) = participant.handle.try_deliver(frame.clone()) {
                        failed.push((participant.handle.token(), reason));
                    }
                }
            }
        }

        for (token, reason) in failed {
            warn!(
                target: "cs.registry",
                consultation_id = consultation_id,
                side = %token.side,
                reason = reason.as_str(),
                "Dropping handle that could not take a frame"
            );
            self.remove_participant(token, Some(reason));
        }
    }

    /// Remove the handle if it is still the current one for its side.
    /// `reason` is `None` for a client-initiated leave.
    fn remove_participant(&mut self, token: JoinToken, reason: Option<DropReason>) {
        let Some(room) = self.rooms.get_mut(&token.consultation_id) else {
            return;
        };
        let is_current = room
            .participants
            .get(&token.side)
            .is_some_and(|p| p.handle.token() == token);
        if !is_current {
            return;
        }
        let Some(participant) = room.participants.remove(&token.side) else {
            return;
        };

        match reason {
            None => participant.handle.close("left"),
            Some(reason) => {
                participant.handle.cancel();
                metrics::record_handle_dropped(reason.as_str());
            }
        }

        let peer_present = room.participants.contains_key(&token.side.peer());
        if room.participants.is_empty() {
            room.empty_since = Some(Instant::now());
        }

        debug!(
            target: "cs.registry",
            consultation_id = token.consultation_id,
            side = %token.side,
            connection_id = token.connection_id,
            "Participant left room"
        );

        if peer_present {
            self.deliver(
                token.consultation_id,
                &[token.side.peer()],
                &RoomFrame::system(PEER_LEFT),
            );
        }
        self.update_gauges();
    }

    fn close_room(&mut self, consultation_id: ConsultationId, reason: &str) {
        let Some(room) = self.rooms.remove(&consultation_id) else {
            return;
        };
        for participant in room.participants.values() {
            participant.handle.close(reason);
        }
        info!(
            target: "cs.registry",
            consultation_id = consultation_id,
            reason = reason,
            closed_handles = room.participants.len(),
            "Room closed"
        );
        self.update_gauges();
    }

    fn release_idle_rooms(&mut self) {
        let grace = self.settings.empty_room_grace;
        let before = self.rooms.len();
        self.rooms.retain(|consultation_id, room| {
            let expired = room.participants.is_empty()
                && room.empty_since.is_some_and(|since| since.elapsed() >= grace);
            if expired {
                debug!(
                    target: "cs.registry",
                    consultation_id = *consultation_id,
                    "Released empty room"
                );
            }
            !expired
        });
        if self.rooms.len() != before {
            self.update_gauges();
        }
    }

    fn current_participant_mut(&mut self, token: JoinToken) -> Option<&mut Participant> {
        self.rooms
            .get_mut(&token.consultation_id)?
            .participants
            .get_mut(&token.side)
            .filter(|p| p.handle.token() == token)
    }

    fn snapshot(&self, consultation_id: ConsultationId) -> Option<RoomSnapshot> {
        let room = self.rooms.get(&consultation_id)?;
        let participants = [Side::User, Side::Doctor]
            .iter()
            .filter_map(|side| {
                room.participants.get(side).map(|p| ParticipantInfo {
                    side: *side,
                    connection_id: p.handle.token().connection_id,
                    joined_at: p.joined_at,
                    last_seen_at: p.last_seen_at,
                })
            })
            .collect();
        Some(RoomSnapshot {
            consultation_id,
            participants,
        })
    }

    fn connection_count(&self) -> usize {
        self.rooms.values().map(|r| r.participants.len()).sum()
    }

    fn update_gauges(&self) {
        metrics::set_registry_gauges(self.rooms.len(), self.connection_count());
    }
}
