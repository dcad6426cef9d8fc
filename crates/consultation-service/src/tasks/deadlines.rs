//! Session deadline timer.
//!
//! One timer per unended consultation, kept in a `DelayQueue`. Arming an
//! already armed consultation moves its deadline. Expired ids are emitted
//! on a channel; the worker started by [`start_deadline_worker`] hands
//! them to the orchestrator, which re-reads the consultation before ending
//! anything.
//!
//! Timers are process-local. After a restart the orchestrator re-arms
//! every open consultation from the store.

use crate::errors::ConsultationError;
use crate::models::ConsultationId;
use crate::orchestrator::RoomOrchestrator;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, info, instrument, warn};

/// Depth of the scheduler command queue.
const DEADLINE_CHANNEL_BUFFER: usize = 1024;

/// Depth of the expiry channel.
const EXPIRED_CHANNEL_BUFFER: usize = 256;

enum DeadlineMessage {
    Arm {
        consultation_id: ConsultationId,
        after: Duration,
    },
    Disarm {
        consultation_id: ConsultationId,
    },
    Armed {
        respond_to: oneshot::Sender<usize>,
    },
}

/// Handle to the deadline scheduler.
#[derive(Clone)]
pub struct DeadlineHandle {
    sender: mpsc::Sender<DeadlineMessage>,
    cancel_token: CancellationToken,
}

impl DeadlineHandle {
    /// Spawn the scheduler. Returns the handle and the channel of expired
    /// consultation ids.
    #[must_use]
    pub fn spawn(cancel_token: CancellationToken) -> (Self, mpsc::Receiver<ConsultationId>) {
        let (sender, receiver) = mpsc::channel(DEADLINE_CHANNEL_BUFFER);
        let (expired_tx, expired_rx) = mpsc::channel(EXPIRED_CHANNEL_BUFFER);

        let scheduler = DeadlineScheduler {
            receiver,
            expired: expired_tx,
            cancel_token: cancel_token.clone(),
            queue: DelayQueue::new(),
            keys: HashMap::new(),
        };
        tokio::spawn(scheduler.run());

        (
            Self {
                sender,
                cancel_token,
            },
            expired_rx,
        )
    }

    /// Fire for `consultation_id` after `after`, replacing any earlier timer.
    pub async fn arm(
        &self,
        consultation_id: ConsultationId,
        after: Duration,
    ) -> Result<(), ConsultationError> {
        self.sender
            .send(DeadlineMessage::Arm {
                consultation_id,
                after,
            })
            .await
            .map_err(|e| ConsultationError::Internal(format!("channel send failed: {e}")))
    }

    pub async fn disarm(&self, consultation_id: ConsultationId) -> Result<(), ConsultationError> {
        self.sender
            .send(DeadlineMessage::Disarm { consultation_id })
            .await
            .map_err(|e| ConsultationError::Internal(format!("channel send failed: {e}")))
    }

    /// Number of armed timers.
    pub async fn armed(&self) -> Result<usize, ConsultationError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DeadlineMessage::Armed { respond_to: tx })
            .await
            .map_err(|e| ConsultationError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ConsultationError::Internal(format!("response receive failed: {e}")))
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

struct DeadlineScheduler {
    receiver: mpsc::Receiver<DeadlineMessage>,
    expired: mpsc::Sender<ConsultationId>,
    cancel_token: CancellationToken,
    queue: DelayQueue<ConsultationId>,
    keys: HashMap<ConsultationId, delay_queue::Key>,
}

impl DeadlineScheduler {
    #[instrument(skip_all, name = "cs.task.deadlines")]
    async fn run(mut self) {
        info!(target: "cs.task.deadlines", "Deadline scheduler started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "cs.task.deadlines",
                        armed = self.keys.len(),
                        "Deadline scheduler received shutdown signal, exiting"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    let Some(message) = msg else {
                        break;
                    };
                    self.handle_message(message);
                }

                Some(expired) = self.queue.next() => {
                    let consultation_id = expired.into_inner();
                    self.keys.remove(&consultation_id);
                    debug!(
                        target: "cs.task.deadlines",
                        consultation_id = consultation_id,
                        "Deadline expired"
                    );
                    if self.expired.send(consultation_id).await.is_err() {
                        warn!(target: "cs.task.deadlines", "Expiry consumer gone, exiting");
                        break;
                    }
                }
            }
        }
    }

    fn handle_message(&mut self, message: DeadlineMessage) {
        match message {
            DeadlineMessage::Arm {
                consultation_id,
                after,
            } => {
                if let Some(key) = self.keys.get(&consultation_id) {
                    self.queue.reset(key, after);
                } else {
                    let key = self.queue.insert(consultation_id, after);
                    self.keys.insert(consultation_id, key);
                }
            }
            DeadlineMessage::Disarm { consultation_id } => {
                if let Some(key) = self.keys.remove(&consultation_id) {
                    self.queue.remove(&key);
                }
            }
            DeadlineMessage::Armed { respond_to } => {
                let _ = respond_to.send(self.keys.len());
            }
        }
    }
}

/// Feed expired deadlines to the orchestrator until cancelled.
#[instrument(skip_all, name = "cs.task.deadline_worker")]
pub async fn start_deadline_worker(
    orchestrator: Arc<RoomOrchestrator>,
    mut expired: mpsc::Receiver<ConsultationId>,
    cancel_token: CancellationToken,
) {
    info!(target: "cs.task.deadlines", "Starting deadline worker");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!(
                    target: "cs.task.deadlines",
                    "Deadline worker received shutdown signal, exiting"
                );
                break;
            }

            msg = expired.recv() => {
                let Some(consultation_id) = msg else {
                    break;
                };
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    if let Err(e) = orchestrator.handle_deadline(consultation_id).await {
                        tracing::error!(
                            target: "cs.task.deadlines",
                            consultation_id = consultation_id,
                            error = %e,
                            "Deadline handling failed"
                        );
                    }
                });
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn next(rx: &mut mpsc::Receiver<ConsultationId>) -> ConsultationId {
        tokio::time::timeout(Duration::from_secs(3600), rx.recv())
            .await
            .expect("no deadline fired")
            .expect("expiry channel closed")
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadlines_fire_in_due_order() {
        let (deadlines, mut expired) = DeadlineHandle::spawn(CancellationToken::new());

        deadlines.arm(1, Duration::from_secs(10)).await.unwrap();
        deadlines.arm(2, Duration::from_secs(5)).await.unwrap();

        assert_eq!(next(&mut expired).await, 2);
        assert_eq!(next(&mut expired).await, 1);
        assert_eq!(deadlines.armed().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_moves_deadline() {
        let (deadlines, mut expired) = DeadlineHandle::spawn(CancellationToken::new());

        deadlines.arm(1, Duration::from_secs(5)).await.unwrap();
        deadlines.arm(2, Duration::from_secs(10)).await.unwrap();
        deadlines.arm(1, Duration::from_secs(20)).await.unwrap();

        assert_eq!(deadlines.armed().await.unwrap(), 2);
        assert_eq!(next(&mut expired).await, 2);
        assert_eq!(next(&mut expired).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_prevents_expiry() {
        let (deadlines, mut expired) = DeadlineHandle::spawn(CancellationToken::new());

        deadlines.arm(1, Duration::from_secs(5)).await.unwrap();
        deadlines.arm(2, Duration::from_secs(10)).await.unwrap();
        deadlines.disarm(1).await.unwrap();
        // Disarming an unknown id is a no-op.
        deadlines.disarm(99).await.unwrap();

        assert_eq!(next(&mut expired).await, 2);
        assert_eq!(deadlines.armed().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_scheduler() {
        let (deadlines, mut expired) = DeadlineHandle::spawn(CancellationToken::new());
        deadlines.cancel();

        assert!(expired.recv().await.is_none());
        assert!(deadlines.arm(1, Duration::from_secs(1)).await.is_err());
    }
}
