//! Board rooms: which sockets receive a board's events.
//!
//! A room exists while at least one socket has joined it. Delivery is
//! best-effort `try_send`; a client whose queue is full misses the frame and
//! has to resync from a snapshot.

use model::Frame;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::state::AppState;

/// Where a mutation came from. A socket never gets its own change back;
/// HTTP has no socket identity, so the whole room does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Http,
    Socket(Uuid),
}

impl Origin {
    #[must_use]
    pub fn excluded(self) -> Option<Uuid> {
        match self {
            Self::Http => None,
            Self::Socket(client_id) => Some(client_id),
        }
    }
}

pub async fn join(state: &AppState, board_id: Uuid, client_id: Uuid, tx: mpsc::Sender<Frame>) {
    let mut rooms = state.rooms.write().await;
    let room = rooms.entry(board_id).or_default();
    room.clients.insert(client_id, tx);
    info!(%board_id, %client_id, clients = room.clients.len(), "client joined room");
}

pub async fn part(state: &AppState, board_id: Uuid, client_id: Uuid) {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(&board_id) else {
        return;
    };
    room.clients.remove(&client_id);
    info!(%board_id, %client_id, remaining = room.clients.len(), "client left room");
    if room.clients.is_empty() {
        rooms.remove(&board_id);
    }
}

/// Drop every client sender of the room. Sockets see their queue close and
/// disconnect.
pub async fn close(state: &AppState, board_id: Uuid) {
    if let Some(room) = state.rooms.write().await.remove(&board_id) {
        info!(%board_id, clients = room.clients.len(), "room closed");
    }
}

/// Send a frame to all clients of a board, optionally excluding one.
pub async fn broadcast(state: &AppState, board_id: Uuid, frame: &Frame, exclude: Option<Uuid>) {
    let rooms = state.rooms.read().await;
    let Some(room) = rooms.get(&board_id) else {
        return;
    };

    for (client_id, tx) in &room.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        if tx.try_send(frame.clone()).is_err() {
            debug!(%board_id, %client_id, event = %frame.event, "dropped frame for slow or closed client");
        }
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
