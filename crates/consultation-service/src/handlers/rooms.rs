//! Room socket handler.
//!
//! `GET /{users|doctors}/consultations/{id}/rooms` upgrades to a WebSocket
//! that joins the consultation's room.
//!
//! Server to client (JSON text frames):
//! ```json
//! {"kind": "text", "content": "hello", "created_at": "...", "sender_side": "user"}
//! {"kind": "system", "content": "peer-joined", "created_at": "...", "sender_side": null}
//! ```
//!
//! Client to server (JSON text frames), appended like `POST .../chats`:
//! ```json
//! {"content": "hello", "type": "text"}
//! ```
//!
//! The write half belongs to the registry's connection actor. This task
//! owns the read half until the client leaves or the registry closes the
//! handle.

use super::consultation_id;
use crate::actors::{JoinTicket, WsSink};
use crate::errors::ConsultationError;
use crate::models::api::SendMessageRequest;
use crate::models::{ConsultationId, Principal};
use crate::orchestrator::RoomOrchestrator;
use crate::routes::AppState;
use axum::extract::rejection::PathRejection;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Extension;
use futures::stream::SplitStream;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[instrument(skip_all, name = "cs.handlers.join_room")]
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<ConsultationId>, PathRejection>,
    ws: WebSocketUpgrade,
) -> Result<Response, ConsultationError> {
    let id = consultation_id(path)?;
    // Refuse before upgrading so the client sees a status code.
    state.orchestrator.admit(&principal, id).await?;

    let orchestrator = Arc::clone(&state.orchestrator);
    Ok(ws.on_upgrade(move |socket| run_socket(orchestrator, principal, id, socket)))
}

async fn run_socket(
    orchestrator: Arc<RoomOrchestrator>,
    principal: Principal,
    id: ConsultationId,
    socket: WebSocket,
) {
    let (sender, receiver) = socket.split();

    let ticket = match orchestrator
        .join_room(&principal, id, Box::new(WsSink::new(sender)))
        .await
    {
        Ok(ticket) => ticket,
        Err(e) => {
            // The session ended between the upgrade and the join.
            warn!(
                target: "cs.handlers.rooms",
                consultation_id = id,
                error = %e,
                "Room join failed after upgrade"
            );
            return;
        }
    };

    read_frames(&orchestrator, &principal, id, &ticket, receiver).await;

    if let Err(e) = orchestrator.leave_room(ticket.token).await {
        debug!(target: "cs.handlers.rooms", error = %e, "Leave after socket close failed");
    }
}

async fn read_frames(
    orchestrator: &RoomOrchestrator,
    principal: &Principal,
    id: ConsultationId,
    ticket: &JoinTicket,
    mut receiver: SplitStream<WebSocket>,
) {
    loop {
        tokio::select! {
            () = ticket.closed.cancelled() => {
                debug!(
                    target: "cs.handlers.rooms",
                    consultation_id = id,
                    "Handle closed by registry"
                );
                break;
            }

            frame = receiver.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(target: "cs.handlers.rooms", error = %e, "Socket read failed");
                        break;
                    }
                    Some(Ok(_)) => {
                        touch(orchestrator, ticket).await;
                        continue;
                    }
                };
                touch(orchestrator, ticket).await;

                let request = match serde_json::from_str::<SendMessageRequest>(&text) {
                    Ok(request) => request,
                    Err(e) => {
                        debug!(target: "cs.handlers.rooms", error = %e, "Ignoring malformed frame");
                        continue;
                    }
                };
                if let Err(e) = orchestrator
                    .send_message(principal, id, &request.kind, &request.content)
                    .await
                {
                    debug!(
                        target: "cs.handlers.rooms",
                        consultation_id = id,
                        code = e.code(),
                        "Inbound message rejected"
                    );
                }
            }
        }
    }
}

async fn touch(orchestrator: &RoomOrchestrator, ticket: &JoinTicket) {
    if let Err(e) = orchestrator.touch(ticket.token).await {
        debug!(target: "cs.handlers.rooms", error = %e, "Presence touch failed");
    }
}
