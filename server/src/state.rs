//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the layer store, the live rooms (connected clients per board),
//! the per-board write locks and the server configuration.

use std::collections::HashMap;
use std::sync::Arc;

use model::Frame;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, mpsc};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::store::BoardStore;

// =============================================================================
// ROOM
// =============================================================================

/// Live clients of one board.
#[derive(Default)]
pub struct Room {
    /// `client_id` -> sender for outgoing frames.
    pub clients: HashMap<Uuid, mpsc::Sender<Frame>>,
}

// =============================================================================
// BOARD LOCKS
// =============================================================================

/// One async mutex per board, held across a mutation's read-modify-write.
#[derive(Clone, Default)]
pub struct BoardLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl BoardLocks {
    pub async fn acquire(&self, board_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self.inner.lock().await.entry(board_id).or_default().clone();
        lock.lock_owned().await
    }

    pub async fn forget(&self, board_id: Uuid) {
        self.inner.lock().await.remove(&board_id);
    }

    /// Drop the board's entry unless another task holds or awaits it. Used
    /// after a lookup found no such board.
    pub async fn release_idle(&self, board_id: Uuid) {
        let mut inner = self.inner.lock().await;
        if inner.get(&board_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            inner.remove(&board_id);
        }
    }

    #[cfg(test)]
    pub async fn tracked_boards(&self) -> usize {
        self.inner.lock().await.len()
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BoardStore>,
    pub rooms: Arc<RwLock<HashMap<Uuid, Room>>>,
    pub locks: BoardLocks,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn BoardStore>, config: ServerConfig) -> Self {
        Self {
            store,
            rooms: Arc::new(RwLock::new(HashMap::new())),
            locks: BoardLocks::default(),
            config: Arc::new(config),
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
#[path = "state_helpers_test.rs"]
pub mod test_helpers;

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
