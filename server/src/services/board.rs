//! Board service: create, snapshot, rename and delete boards.
//!
//! DESIGN
//! ======
//! A board is created with its full set of empty layers, so every later
//! mutation can assume the layer structure exists. `get_board` returns the
//! board plus all layer documents; clients use it as their full-resync
//! payload after (re)connecting.

use model::ErrorCode;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::services::room;
use crate::state::AppState;
use crate::store::{BoardRecord, DetachSection, LayerRecord, NewBoard, StoreError};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("board not found: {0}")]
    NotFound(Uuid),
    #[error("board name must not be empty")]
    EmptyName,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ErrorCode for BoardError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_BOARD_NOT_FOUND",
            Self::EmptyName => "E_INVALID_NAME",
            Self::Store(e) => e.error_code(),
        }
    }

    fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::EmptyName => 400,
            Self::Store(e) => e.status_code(),
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.retryable())
    }
}

/// Board with every layer document, bottom layer first.
#[derive(Debug, Clone, Serialize)]
pub struct BoardSnapshot {
    #[serde(flatten)]
    pub board: BoardRecord,
    pub layers: Vec<LayerRecord>,
}

// =============================================================================
// CRUD
// =============================================================================

/// # Errors
///
/// `EmptyName`, or `DuplicateName` when the section already has a board
/// with this name.
pub async fn create_board(state: &AppState, mut new: NewBoard) -> Result<BoardRecord, BoardError> {
    new.name = new.name.trim().to_owned();
    if new.name.is_empty() {
        return Err(BoardError::EmptyName);
    }
    let board = state
        .store
        .insert_board(new, state.config.board_layer_count)
        .await?;
    info!(board_id = %board.id, section_id = %board.section_id, layers = board.layer_ids.len(), "board created");
    Ok(board)
}

/// # Errors
///
/// `NotFound` when the board does not exist.
pub async fn get_board(state: &AppState, board_id: Uuid) -> Result<BoardSnapshot, BoardError> {
    let board = state
        .store
        .board(board_id)
        .await?
        .ok_or(BoardError::NotFound(board_id))?;
    let layers = state.store.layers(&board.layer_ids).await?;
    Ok(BoardSnapshot { board, layers })
}

/// # Errors
///
/// `EmptyName`, `NotFound`, or `DuplicateName` within the section.
pub async fn rename_board(state: &AppState, board_id: Uuid, name: &str) -> Result<BoardRecord, BoardError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BoardError::EmptyName);
    }
    let board = state
        .store
        .rename_board(board_id, name)
        .await?
        .ok_or(BoardError::NotFound(board_id))?;
    info!(%board_id, name, "board renamed");
    Ok(board)
}

/// Delete the board and its layers, then disconnect its room.
///
/// # Errors
///
/// `NotFound` when the board does not exist.
pub async fn delete_board(state: &AppState, board_id: Uuid, detach: DetachSection) -> Result<(), BoardError> {
    {
        let _guard = state.locks.acquire(board_id).await;
        if !state.store.delete_board(board_id, detach).await? {
            return Err(BoardError::NotFound(board_id));
        }
    }
    state.locks.forget(board_id).await;
    room::close(state, board_id).await;
    info!(%board_id, ?detach, "board deleted");
    Ok(())
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
