//! Outbound worker for one room socket.
//!
//! Each registered handle gets its own worker so that a slow peer never
//! blocks the registry dispatcher. The worker owns the write half of the
//! socket (behind [`FrameSink`]), writes frames in queue order and bounds
//! every write by the outbound send deadline. A failed or late write stops
//! the worker and is reported back to the registry as `HandleFailed`.

use super::messages::{ConnectionMessage, DropReason, JoinToken};
use super::metrics::{ActorType, MailboxMonitor};
use super::registry::RegistryHandle;
use crate::models::RoomFrame;
use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Depth of a worker queue. A peer this far behind is dropped.
const CONNECTION_QUEUE_DEPTH: usize = 64;

/// Socket write failure.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("socket closed")]
    Closed,

    #[error("socket write failed: {0}")]
    Transport(String),

    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Write half of a room socket.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, frame: &RoomFrame) -> Result<(), SinkError>;

    /// Best-effort close with a human-readable reason.
    async fn close(&mut self, reason: &str);
}

/// [`FrameSink`] over the write half of an axum WebSocket. Frames are JSON
/// text messages.
pub struct WsSink {
    inner: SplitSink<WebSocket, WsMessage>,
}

impl WsSink {
    pub fn new(inner: SplitSink<WebSocket, WsMessage>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_frame(&mut self, frame: &RoomFrame) -> Result<(), SinkError> {
        let text = serde_json::to_string(frame)?;
        self.inner
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))
    }

    async fn close(&mut self, reason: &str) {
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: Cow::Owned(reason.to_string()),
        };
        let _ = self.inner.send(WsMessage::Close(Some(frame))).await;
        let _ = self.inner.close().await;
    }
}

/// Handle the dispatcher keeps for each participant.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    token: JoinToken,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionHandle {
    #[must_use]
    pub fn token(&self) -> JoinToken {
        self.token
    }

    /// Fires once the worker has stopped.
    #[must_use]
    pub fn closed(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Queue a frame without waiting.
    pub fn try_deliver(&self, frame: RoomFrame) -> Result<(), DropReason> {
        match self.sender.try_send(ConnectionMessage::Send { frame }) {
            Ok(()) => {
                self.mailbox.record_enqueue();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.mailbox.record_drop();
                Err(DropReason::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(DropReason::Closed),
        }
    }

    /// Close after the frames already queued. Falls back to cancellation
    /// when the queue cannot take the close.
    pub fn close(&self, reason: &str) {
        let message = ConnectionMessage::Close {
            reason: reason.to_string(),
        };
        if self.sender.try_send(message).is_ok() {
            self.mailbox.record_enqueue();
        } else {
            self.cancel_token.cancel();
        }
    }

    /// Stop the worker immediately.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

/// The outbound worker.
pub struct ConnectionActor {
    token: JoinToken,
    sink: Box<dyn FrameSink>,
    receiver: mpsc::Receiver<ConnectionMessage>,
    cancel_token: CancellationToken,
    registry: RegistryHandle,
    send_deadline: Duration,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionActor {
    /// Spawn a worker for `sink`. `cancel_token` should be a child of the
    /// registry token so shutdown reaches every socket.
    pub fn spawn(
        token: JoinToken,
        sink: Box<dyn FrameSink>,
        send_deadline: Duration,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> ConnectionHandle {
        let (sender, receiver) = mpsc::channel(CONNECTION_QUEUE_DEPTH);
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Connection,
            format!(
                "{}:{}:{}",
                token.consultation_id, token.side, token.connection_id
            ),
        ));

        let actor = Self {
            token,
            sink,
            receiver,
            cancel_token: cancel_token.clone(),
            registry,
            send_deadline,
            mailbox: Arc::clone(&mailbox),
        };
        tokio::spawn(actor.run());

        ConnectionHandle {
            sender,
            cancel_token,
            token,
            mailbox,
        }
    }

    #[instrument(
        skip_all,
        name = "cs.registry.connection",
        fields(
            consultation_id = self.token.consultation_id,
            side = %self.token.side,
            connection_id = self.token.connection_id
        )
    )]
    async fn run(mut self) {
        debug!(target: "cs.registry.connection", "Outbound worker started");

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    self.close_sink("shutdown").await;
                    break;
                }

                msg = self.receiver.recv() => {
                    let Some(message) = msg else {
                        break;
                    };
                    self.mailbox.record_dequeue();

                    match message {
                        ConnectionMessage::Send { frame } => {
                            if let Err(reason) = self.write(&frame).await {
                                if let Err(e) = self.registry.report_failure(self.token, reason).await {
                                    debug!(
                                        target: "cs.registry.connection",
                                        error = %e,
                                        "Registry gone while reporting a failed handle"
                                    );
                                }
                                break;
                            }
                        }
                        ConnectionMessage::Close { reason } => {
                            self.close_sink(&reason).await;
                            break;
                        }
                    }
                }
            }
        }

        self.cancel_token.cancel();
        info!(
            target: "cs.registry.connection",
            frames_written = self.mailbox.messages_processed(),
            "Outbound worker stopped"
        );
    }

    async fn write(&mut self, frame: &RoomFrame) -> Result<(), DropReason> {
        match tokio::time::timeout(self.send_deadline, self.sink.send_frame(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(target: "cs.registry.connection", error = %e, "Socket write failed");
                Err(DropReason::SendFailed)
            }
            Err(_) => {
                warn!(
                    target: "cs.registry.connection",
                    deadline_ms = self.send_deadline.as_millis() as u64,
                    "Socket write exceeded send deadline"
                );
                Err(DropReason::SendTimeout)
            }
        }
    }

    async fn close_sink(&mut self, reason: &str) {
        if tokio::time::timeout(self.send_deadline, self.sink.close(reason))
            .await
            .is_err()
        {
            debug!(target: "cs.registry.connection", "Socket close timed out");
        }
    }
}

/// Sinks for tests and the test harness.
pub mod mock {
    use super::*;

    /// What a [`ChannelSink`] observed.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SinkEvent {
        Frame(RoomFrame),
        Closed(String),
    }

    /// Sink that forwards every frame to an unbounded channel.
    pub struct ChannelSink {
        tx: mpsc::UnboundedSender<SinkEvent>,
    }

    impl ChannelSink {
        #[must_use]
        pub fn pair() -> (Box<dyn FrameSink>, mpsc::UnboundedReceiver<SinkEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Box::new(Self { tx }), rx)
        }
    }

    #[async_trait]
    impl FrameSink for ChannelSink {
        async fn send_frame(&mut self, frame: &RoomFrame) -> Result<(), SinkError> {
            self.tx
                .send(SinkEvent::Frame(frame.clone()))
                .map_err(|_| SinkError::Closed)
        }

        async fn close(&mut self, reason: &str) {
            let _ = self.tx.send(SinkEvent::Closed(reason.to_string()));
        }
    }

    /// Sink whose writes never complete.
    pub struct StalledSink;

    #[async_trait]
    impl FrameSink for StalledSink {
        async fn send_frame(&mut self, _frame: &RoomFrame) -> Result<(), SinkError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn close(&mut self, _reason: &str) {}
    }

    /// Sink whose writes always fail.
    pub struct BrokenSink;

    #[async_trait]
    impl FrameSink for BrokenSink {
        async fn send_frame(&mut self, _frame: &RoomFrame) -> Result<(), SinkError> {
            Err(SinkError::Transport("connection reset by peer".to_string()))
        }

        async fn close(&mut self, _reason: &str) {}
    }
}
