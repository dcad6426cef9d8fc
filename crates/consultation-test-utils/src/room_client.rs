//! WebSocket client for room sockets.

use crate::server_harness::TestServer;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How long [`RoomClient::next_event`] waits before failing the test.
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// What a room socket observed.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// A JSON frame `{kind, content, created_at, sender_side}`.
    Frame(serde_json::Value),
    /// Close frame reason, `None` when the stream ended without one.
    Closed(Option<String>),
}

impl RoomEvent {
    /// True for a system frame with the given content.
    pub fn is_system(&self, content: &str) -> bool {
        matches!(self, RoomEvent::Frame(frame)
            if frame["kind"] == "system" && frame["content"] == content)
    }
}

pub struct RoomClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RoomClient {
    /// Open `/{users|doctors}/consultations/{id}/rooms` with the token in
    /// the query string.
    pub async fn connect(
        server: &TestServer,
        side_prefix: &str,
        consultation_id: i64,
        token: &str,
    ) -> Result<Self, anyhow::Error> {
        let url = room_url(server, side_prefix, consultation_id, token);
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| anyhow::anyhow!("Room connect failed: {}", e))?;
        Ok(Self { stream })
    }

    /// Attempt a connection that the server should refuse before the
    /// upgrade; returns the HTTP status.
    pub async fn connect_refused(
        server: &TestServer,
        side_prefix: &str,
        consultation_id: i64,
        token: &str,
    ) -> Result<u16, anyhow::Error> {
        let url = room_url(server, side_prefix, consultation_id, token);
        match connect_async(url).await {
            Err(tungstenite::Error::Http(response)) => Ok(response.status().as_u16()),
            Err(e) => Err(anyhow::anyhow!("Unexpected connect error: {}", e)),
            Ok(_) => Err(anyhow::anyhow!("Room connection was accepted")),
        }
    }

    /// Send `{content, type: "text"}`.
    pub async fn send_text(&mut self, content: &str) -> Result<(), anyhow::Error> {
        let body = serde_json::json!({ "content": content, "type": "text" }).to_string();
        self.stream.send(Message::Text(body)).await?;
        Ok(())
    }

    /// Next frame or close, skipping pings and pongs.
    pub async fn next_event(&mut self) -> Result<RoomEvent, anyhow::Error> {
        loop {
            let next = tokio::time::timeout(EVENT_TIMEOUT, self.stream.next())
                .await
                .map_err(|_| anyhow::anyhow!("No room event within {:?}", EVENT_TIMEOUT))?;
            match next {
                Some(Ok(Message::Text(text))) => {
                    return Ok(RoomEvent::Frame(serde_json::from_str(&text)?));
                }
                Some(Ok(Message::Close(frame))) => {
                    return Ok(RoomEvent::Closed(frame.map(|f| f.reason.to_string())));
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return Ok(RoomEvent::Closed(None)),
            }
        }
    }

    /// Next JSON frame; fails if the socket closes instead.
    pub async fn next_frame(&mut self) -> Result<serde_json::Value, anyhow::Error> {
        match self.next_event().await? {
            RoomEvent::Frame(frame) => Ok(frame),
            RoomEvent::Closed(reason) => Err(anyhow::anyhow!("Room closed: {:?}", reason)),
        }
    }

    /// Close from the client side.
    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.stream.close(None).await?;
        Ok(())
    }
}

fn room_url(server: &TestServer, side_prefix: &str, consultation_id: i64, token: &str) -> String {
    server.ws_url(&format!(
        "{side_prefix}/consultations/{consultation_id}/rooms?token={token}"
    ))
}
