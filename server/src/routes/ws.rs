//! WebSocket handler: the per-board realtime channel.
//!
//! DESIGN
//! ======
//! A socket is bound to exactly one board, named by `?boardId=` on the
//! upgrade request. After upgrade the connection enters a `select!` loop:
//! - inbound client frames → parse + validate → mutation service
//! - frames queued by the room → forward to the client
//!
//! The sender of a mutation gets a `done` (or `error`) frame correlated by
//! `parent_id`; every other room member gets the matching board event, which
//! the mutation service queues while it still holds the board lock. The
//! sender never receives its own event.
//!
//! LIFECYCLE
//! =========
//! 1. `Connecting`: `boardId` checked (400 missing/malformed, 404 unknown)
//! 2. `Joined`: socket registered in the room, `session:joined` sent
//! 3. `Active`: frames processed in arrival order
//! 4. `Disconnected`: socket closed or room closed → part

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use model::event::SESSION_JOINED;
use model::{ClientEvent, ErrorCode, EventError, Frame, Status};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ApiError, RequestError, parse_board_id};
use crate::services::element::{self, MutationError};
use crate::services::room::{self, Origin};
use crate::state::AppState;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Joined,
    Active,
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error(transparent)]
    Event(#[from] EventError),
}

impl ErrorCode for GatewayError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidFrame(_) => "E_INVALID_FRAME",
            Self::Event(EventError::UnknownEvent(_)) => "E_UNKNOWN_EVENT",
            Self::Event(EventError::Malformed { .. }) => "E_MALFORMED_EVENT",
        }
    }

    fn status_code(&self) -> u16 {
        400
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(raw) = params.get("boardId") else {
        return ApiError::from(RequestError::InvalidQuery("boardId required".into())).into_response();
    };
    let board_id = match parse_board_id(raw) {
        Ok(id) => id,
        Err(e) => return ApiError::from(e).into_response(),
    };

    match state.store.board(board_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return ApiError::from(MutationError::BoardNotFound(board_id)).into_response();
        }
        Err(e) => return ApiError::from(e).into_response(),
    }

    debug!(%board_id, phase = ?Phase::Connecting, "ws: upgrading");
    ws.on_upgrade(move |socket| run_ws(socket, state, board_id))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, board_id: Uuid) {
    let client_id = Uuid::new_v4();

    // The room holds the only sender; when the room closes, `client_rx` ends.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(state.config.client_channel_capacity);
    room::join(&state, board_id, client_id, client_tx).await;

    let welcome = Frame::notify(SESSION_JOINED, json!({ "clientId": client_id, "boardId": board_id }))
        .with_board_id(board_id);
    let mut phase = Phase::Joined;
    if send_frame(&mut socket, &welcome).await.is_ok() {
        phase = Phase::Active;
        info!(%client_id, %board_id, "ws: client connected");
    }

    while phase == Phase::Active {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        for frame in process_inbound_text(&state, board_id, client_id, text.as_str()).await {
                            if send_frame(&mut socket, &frame).await.is_err() {
                                phase = Phase::Disconnected;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            frame = client_rx.recv() => {
                let Some(frame) = frame else {
                    info!(%client_id, %board_id, "ws: room closed");
                    break;
                };
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    room::part(&state, board_id, client_id).await;
    info!(%client_id, %board_id, phase = ?Phase::Disconnected, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
///
/// The other room members hear about a successful mutation from the mutation
/// service itself; the transport loop only writes what is returned.
async fn process_inbound_text(state: &AppState, board_id: Uuid, client_id: Uuid, text: &str) -> Vec<Frame> {
    let mut req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            let placeholder = Frame::request("error", Value::Null).with_board_id(board_id);
            return vec![placeholder.error_from(&GatewayError::InvalidFrame(e.to_string()))];
        }
    };
    req.board_id = Some(board_id);
    debug!(%client_id, id = %req.id, event = %req.event, "ws: recv frame");

    let event = match ClientEvent::parse(&req.event, req.data.clone()) {
        Ok(event) => event,
        Err(e) => return vec![req.error_from(&GatewayError::from(e))],
    };

    match apply(state, board_id, Origin::Socket(client_id), event).await {
        Ok(reply) => vec![req.done(reply)],
        Err(e) => vec![req.error_from(&e)],
    }
}

async fn apply(state: &AppState, board_id: Uuid, origin: Origin, event: ClientEvent) -> Result<Value, MutationError> {
    let reply = match event {
        ClientEvent::AddElement(add) => {
            to_json(&element::add_element(state, board_id, origin, add.layer_number, add.element).await?)
        }
        ClientEvent::UpdateElement(update) => {
            to_json(&element::update_element(state, board_id, origin, &update.id, &update.new_attrs).await?)
        }
        ClientEvent::RemoveElement(remove) => {
            to_json(&element::remove_element(state, board_id, origin, remove.id()).await?)
        }
        ClientEvent::ChangeElementLayer(change) => {
            to_json(&element::change_element_layer(state, board_id, origin, &change.id, change.action).await?)
        }
    };
    Ok(reply)
}

// =============================================================================
// HELPERS
// =============================================================================

fn to_json(value: &impl serde::Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame
            .data
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        warn!(id = %frame.id, event = %frame.event, code, message = frame.message().unwrap_or("-"), "ws: send frame status=Error");
    } else {
        debug!(id = %frame.id, event = %frame.event, status = ?frame.status, "ws: send frame");
    }
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
