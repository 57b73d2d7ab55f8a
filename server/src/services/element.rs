//! Board mutation service: the only code path that changes board content.
//!
//! DESIGN
//! ======
//! Every operation runs the same cycle while holding the board's lock:
//!
//! 1. load the board and all of its layer documents,
//! 2. apply one `LayerSet` primitive in memory,
//! 3. write back only the layers that changed (one transaction when two
//!    layers change), each guarded by the version it was read at,
//! 4. refresh the board's `updated_at`,
//! 5. queue the matching board event on every peer of the room.
//!
//! The lock serializes writers inside this process; the version check turns
//! a writer from another process into `Conflict` instead of a lost update.
//! Events are queued before the lock is released, so every peer receives a
//! board's events in commit order. A move that changes nothing writes and
//! announces nothing.
//!
//! HTTP and websocket handlers are thin adapters over these functions; the
//! `Origin` they pass decides who is left out of the broadcast.

use model::event::{DEFAULT_LAYER_NUMBER, ElementAdded, ElementMoved, ElementRemoved, ElementUpdated};
use model::{Attrs, BoardEvent, Direction, Element, ErrorCode, LayerChange, LayerError, LayerSet, Moved, Position};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::services::room::{self, Origin};
use crate::state::AppState;
use crate::store::{BoardRecord, LayerRecord, StoreError};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("board not found: {0}")]
    BoardNotFound(Uuid),
    #[error("board {board_id} is missing layer {layer}")]
    LayerMissing { board_id: Uuid, layer: usize },
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ErrorCode for MutationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::BoardNotFound(_) => "E_BOARD_NOT_FOUND",
            Self::LayerMissing { .. } | Self::Layer(LayerError::LayerOutOfRange { .. }) => "E_LAYER_NOT_FOUND",
            Self::Layer(LayerError::ElementNotFound(_)) => "E_ELEMENT_NOT_FOUND",
            Self::Layer(LayerError::DuplicateId(_)) => "E_DUPLICATE_ELEMENT",
            Self::Layer(LayerError::PositionOutOfRange(_)) => "E_POSITION_OUT_OF_RANGE",
            Self::Layer(LayerError::PositionMismatch { .. }) => "E_POSITION_MISMATCH",
            Self::Layer(LayerError::Element(model::ElementError::NoValidFields)) => "E_NO_VALID_FIELDS",
            Self::Layer(LayerError::Element(_)) => "E_INVALID_ELEMENT",
            Self::Store(e) => e.error_code(),
        }
    }

    fn status_code(&self) -> u16 {
        match self {
            Self::BoardNotFound(_)
            | Self::LayerMissing { .. }
            | Self::Layer(LayerError::LayerOutOfRange { .. } | LayerError::ElementNotFound(_)) => 404,
            Self::Layer(_) => 400,
            Self::Store(e) => e.status_code(),
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.retryable())
    }
}

/// Where a new element landed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placed {
    pub layer_number: usize,
    pub index: usize,
    pub element: Element,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Removed {
    pub message: String,
    pub id: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Updated {
    pub element: Element,
    /// The filtered patch that was actually applied.
    pub new_attrs: Attrs,
}

/// Outcome of any move. `from == to` means nothing was persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relocated {
    pub id: String,
    pub from: Position,
    pub to: Position,
}

impl Relocated {
    fn new(id: &str, moved: Moved) -> Self {
        Self { id: id.to_owned(), from: moved.from, to: moved.to }
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// What one primitive did: the result for the caller, the layers to write
/// back and the event for the room. An empty `touched` writes nothing.
struct Commit<T> {
    out: T,
    touched: Vec<usize>,
    event: Option<BoardEvent>,
}

impl Commit<Moved> {
    fn moved(element_id: &str, moved: Moved) -> Self {
        let event = (!moved.is_noop())
            .then(|| BoardEvent::Moved(ElementMoved { id: element_id.to_owned(), action: moved.as_change() }));
        Self { out: moved, touched: moved.touched_layers(), event }
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Add an element to `layer_number` (default 2), appended on top.
///
/// Checks run in order: the layer, then the id, then the element itself.
///
/// # Errors
///
/// `BoardNotFound`, `LayerOutOfRange` for a layer outside the board
/// (negative included), `DuplicateId` when the id exists anywhere on the
/// board, element validation errors, and store errors (ceiling, conflict).
pub async fn add_element(
    state: &AppState,
    board_id: Uuid,
    origin: Origin,
    layer_number: Option<i64>,
    data: Value,
) -> Result<Placed, MutationError> {
    let placed = mutate(state, board_id, origin, |layers| {
        let layer = layer_number.map_or(Ok(DEFAULT_LAYER_NUMBER), |requested| layers.resolve_layer(requested))?;
        layers.check_layer(layer)?;
        if let Some(id) = data.get("id").and_then(Value::as_str) {
            if layers.contains(id) {
                return Err(LayerError::DuplicateId(id.to_owned()));
            }
        }
        let element = Element::from_value(data).map_err(LayerError::from)?;
        let at = layers.insert(layer, element.clone(), None)?;
        let event = BoardEvent::Added(ElementAdded { layer_number: at.layer, index: at.index, element: element.clone() });
        Ok(Commit {
            out: Placed { layer_number: at.layer, index: at.index, element },
            touched: vec![at.layer],
            event: Some(event),
        })
    })
    .await?;
    info!(%board_id, element_id = placed.element.id(), layer = placed.layer_number, "element added");
    Ok(placed)
}

/// # Errors
///
/// `BoardNotFound`, `ElementNotFound`, store errors.
pub async fn remove_element(
    state: &AppState,
    board_id: Uuid,
    origin: Origin,
    element_id: &str,
) -> Result<Removed, MutationError> {
    let removed = mutate(state, board_id, origin, |layers| {
        let (_, at) = layers.remove(element_id)?;
        let removed = Removed {
            message: format!("element {element_id} removed"),
            id: element_id.to_owned(),
            position: at,
        };
        let event = BoardEvent::Removed(ElementRemoved { id: element_id.to_owned() });
        Ok(Commit { out: removed, touched: vec![at.layer], event: Some(event) })
    })
    .await?;
    info!(%board_id, element_id, position = %removed.position, "element removed");
    Ok(removed)
}

/// Merge the permitted subset of `patch` into the element, in place.
///
/// # Errors
///
/// `BoardNotFound`, `ElementNotFound`, `NoValidFields` when nothing in the
/// patch applies to the element's variant, element validation errors,
/// store errors.
pub async fn update_element(
    state: &AppState,
    board_id: Uuid,
    origin: Origin,
    element_id: &str,
    patch: &Attrs,
) -> Result<Updated, MutationError> {
    let updated = mutate(state, board_id, origin, |layers| {
        let (at, new_attrs) = layers.update(element_id, patch)?;
        let element = layers
            .element_at(at)
            .cloned()
            .ok_or_else(|| LayerError::ElementNotFound(element_id.to_owned()))?;
        let event = BoardEvent::Updated(ElementUpdated { id: element_id.to_owned(), new_attrs: new_attrs.clone() });
        Ok(Commit { out: Updated { element, new_attrs }, touched: vec![at.layer], event: Some(event) })
    })
    .await?;
    debug!(%board_id, element_id, fields = updated.new_attrs.len(), "element updated");
    Ok(updated)
}

/// Swap the element with its neighbour. Up is toward the front.
///
/// # Errors
///
/// `BoardNotFound`, `ElementNotFound`, store errors.
pub async fn move_element_within_layer(
    state: &AppState,
    board_id: Uuid,
    origin: Origin,
    element_id: &str,
    direction: Direction,
) -> Result<Relocated, MutationError> {
    let moved = mutate(state, board_id, origin, |layers| {
        Ok(Commit::moved(element_id, layers.move_within(element_id, direction)?))
    })
    .await?;
    Ok(log_move(board_id, Relocated::new(element_id, moved)))
}

/// Move the element to the adjacent layer at the same index, clamped to the
/// target layer's length. Up is toward the top layer.
///
/// # Errors
///
/// `BoardNotFound`, `ElementNotFound`, store errors.
pub async fn move_element_to_layer(
    state: &AppState,
    board_id: Uuid,
    origin: Origin,
    element_id: &str,
    direction: Direction,
) -> Result<Relocated, MutationError> {
    let moved = mutate(state, board_id, origin, |layers| {
        Ok(Commit::moved(element_id, layers.move_to_layer(element_id, direction)?))
    })
    .await?;
    Ok(log_move(board_id, Relocated::new(element_id, moved)))
}

/// Relocate the element between explicit positions.
///
/// # Errors
///
/// `BoardNotFound`, `LayerOutOfRange` / `PositionOutOfRange` for positions
/// outside the board, `PositionMismatch` when `prev_position` does not hold
/// `element_id`, store errors.
pub async fn change_element_layer(
    state: &AppState,
    board_id: Uuid,
    origin: Origin,
    element_id: &str,
    change: LayerChange,
) -> Result<Relocated, MutationError> {
    let moved = mutate(state, board_id, origin, |layers| {
        Ok(Commit::moved(element_id, layers.change_layer(element_id, change)?))
    })
    .await?;
    Ok(log_move(board_id, Relocated::new(element_id, moved)))
}

fn log_move(board_id: Uuid, relocated: Relocated) -> Relocated {
    if relocated.is_noop() {
        debug!(%board_id, element_id = %relocated.id, at = %relocated.from, "move is a no-op");
    } else {
        info!(%board_id, element_id = %relocated.id, from = %relocated.from, to = %relocated.to, "element moved");
    }
    relocated
}

// =============================================================================
// READ-MODIFY-WRITE
// =============================================================================

/// Run `op` against the board's layers under the board lock, persist the
/// layers it reports as touched and queue its event on the room.
async fn mutate<T>(
    state: &AppState,
    board_id: Uuid,
    origin: Origin,
    op: impl FnOnce(&mut LayerSet) -> Result<Commit<T>, LayerError>,
) -> Result<T, MutationError> {
    let guard = state.locks.acquire(board_id).await;

    let board = match state.store.board(board_id).await {
        Ok(Some(board)) => board,
        Ok(None) => {
            drop(guard);
            state.locks.release_idle(board_id).await;
            return Err(MutationError::BoardNotFound(board_id));
        }
        Err(e) => return Err(e.into()),
    };
    let mut records = load_layers(state, &board).await?;

    let mut layers = LayerSet::from_layers(records.iter().map(|r| r.elements.clone()).collect());
    let Commit { out, touched, event } = op(&mut layers)?;
    if touched.is_empty() {
        return Ok(out);
    }

    let mut dirty = Vec::with_capacity(touched.len());
    for layer in touched {
        let Some(record) = records.get_mut(layer) else {
            return Err(MutationError::LayerMissing { board_id, layer });
        };
        record.elements = layers.layer(layer).map(<[Element]>::to_vec).unwrap_or_default();
        dirty.push(record.clone());
    }

    state.store.save_layers(&dirty).await?;
    state.store.touch_board(board_id).await?;

    if let Some(event) = event {
        room::broadcast(state, board_id, &event.to_frame(board_id), origin.excluded()).await;
    }
    drop(guard);
    Ok(out)
}

/// All layers of the board, in layer order. Any missing record is an error:
/// a partial `LayerSet` would shift every layer number above the gap.
async fn load_layers(state: &AppState, board: &BoardRecord) -> Result<Vec<LayerRecord>, MutationError> {
    let records = state.store.layers(&board.layer_ids).await?;
    if records.len() != board.layer_ids.len() {
        let layer = board
            .layer_ids
            .iter()
            .position(|id| !records.iter().any(|r| r.id == *id))
            .unwrap_or(records.len());
        return Err(MutationError::LayerMissing { board_id: board.id, layer });
    }
    Ok(records)
}

#[cfg(test)]
#[path = "element_test.rs"]
mod tests;
