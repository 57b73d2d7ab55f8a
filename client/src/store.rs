//! Board mirror: the client's reconciled copy of one board.
//!
//! DESIGN
//! ======
//! Every change enters through `BoardMirror::apply`, tagged with its origin:
//!
//! - `Change::Local` is applied immediately (optimistic) and produces the
//!   `Outbound` request to send. The inverse of the change is kept under the
//!   request id until the server answers.
//! - `Change::Remote` is a broadcast event. It only touches local state and
//!   never produces outbound traffic, so a remote change can never be sent
//!   back to the server.
//!
//! Remote events that describe a state the mirror already has are echoes
//! (the client's own HTTP change coming back, or a duplicate delivery) and
//! leave the mirror untouched. The exception is a remote add for an id the
//! client added itself and has not heard back about: the server's element
//! replaces the local one.
//!
//! A `done` reply drops the stored inverse. An `error` reply is
//! authoritative: the inverse is applied and the optimistic change is gone.
//! Anything that cannot be reconciled (a layer the mirror does not have, an
//! event the mirror does not understand) is reported as `ReconcileError`;
//! the caller resyncs from a fresh snapshot.

use std::collections::HashMap;

use log::{debug, warn};
use model::event::{
    AddElement, ChangeElementLayer, DEFAULT_LAYER_NUMBER, ElementAdded, ElementMoved, ElementRemoved, ElementUpdated,
    RemoveElement, SESSION_JOINED, UpdateElement,
};
use model::{
    Attrs, BoardEvent, ClientEvent, Direction, Element, EventError, Frame, LayerChange, LayerError, LayerSet, Moved,
    Position, Status, filter_patch,
};
use uuid::Uuid;

use crate::types::BoardSnapshot;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconcileError {
    #[error("frame for board {found} delivered to the mirror of board {expected}")]
    WrongBoard { expected: Uuid, found: Uuid },
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error(transparent)]
    Event(#[from] EventError),
}

/// An edit made by the local user.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalOp {
    Add { layer_number: Option<usize>, element: Element },
    Update { id: String, attrs: Attrs },
    Remove { id: String },
    MoveWithinLayer { id: String, direction: Direction },
    MoveToLayer { id: String, direction: Direction },
    ChangeLayer { id: String, change: LayerChange },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Local(LocalOp),
    Remote(BoardEvent),
}

/// A request to put on the realtime channel. `request_id` becomes the frame
/// id and comes back as the reply's `parentId`.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub request_id: Uuid,
    pub event: ClientEvent,
}

impl Outbound {
    fn new(event: ClientEvent) -> Self {
        Self { request_id: Uuid::new_v4(), event }
    }

    #[must_use]
    pub fn to_frame(&self, board_id: Uuid) -> Frame {
        let mut frame = self.event.to_frame(board_id);
        frame.id = self.request_id;
        frame
    }
}

/// What `apply` did.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Local change applied; send this to the server.
    Send(Outbound),
    /// State changed without anything to send.
    Applied,
    /// Nothing changed: an echo, a terminal move, or a bookkeeping frame.
    Unchanged,
}

/// How to undo an optimistic change.
#[derive(Debug, Clone, PartialEq)]
enum Inverse {
    Remove { id: String },
    Restore { id: String, attrs: Attrs },
    Reinsert { element: Element, at: Position },
    Relocate { id: String, change: LayerChange },
}

// =============================================================================
// MIRROR
// =============================================================================

#[derive(Debug, Clone)]
pub struct BoardMirror {
    board_id: Uuid,
    layers: LayerSet,
    pending: HashMap<Uuid, Inverse>,
}

impl BoardMirror {
    #[must_use]
    pub fn new(board_id: Uuid, layers: LayerSet) -> Self {
        Self { board_id, layers, pending: HashMap::new() }
    }

    /// Build a mirror from a `GET /boards/:id` snapshot. Layers are placed by
    /// their `layerNumber`, whatever order they arrive in.
    #[must_use]
    pub fn from_snapshot(snapshot: BoardSnapshot) -> Self {
        let mut layers = snapshot.layers;
        layers.sort_by_key(|layer| layer.layer_number);
        let layers = LayerSet::from_layers(layers.into_iter().map(|layer| layer.elements).collect());
        Self::new(snapshot.board.id, layers)
    }

    #[must_use]
    pub fn board_id(&self) -> Uuid {
        self.board_id
    }

    #[must_use]
    pub fn layers(&self) -> &LayerSet {
        &self.layers
    }

    /// Number of local changes still waiting for a reply.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// # Errors
    ///
    /// Local: the `LayerSet` error of the rejected edit; nothing is sent and
    /// the mirror is unchanged. Remote: `ReconcileError::Layer` when the event
    /// does not fit the mirror; the caller should resync.
    pub fn apply(&mut self, change: Change) -> Result<Effect, ReconcileError> {
        match change {
            Change::Local(op) => self.apply_local(op),
            Change::Remote(event) => self.apply_remote(event),
        }
    }

    /// Route one server frame: broadcast events, `done` and `error` replies.
    ///
    /// # Errors
    ///
    /// `WrongBoard` for frames addressed to another board, `Event` for
    /// broadcast events this mirror does not understand, and whatever
    /// applying a remote event returns.
    pub fn handle_frame(&mut self, frame: &Frame) -> Result<Effect, ReconcileError> {
        if let Some(found) = frame.board_id {
            if found != self.board_id {
                return Err(ReconcileError::WrongBoard { expected: self.board_id, found });
            }
        }

        match frame.status {
            Status::Event if frame.event == SESSION_JOINED => Ok(Effect::Unchanged),
            Status::Event => {
                let event = BoardEvent::parse(&frame.event, frame.data.clone())?;
                self.apply_remote(event)
            }
            Status::Done => {
                if let Some(parent) = frame.parent_id {
                    self.acknowledge(parent);
                }
                Ok(Effect::Unchanged)
            }
            Status::Error => {
                warn!(
                    "board {}: {} rejected: {}",
                    self.board_id,
                    frame.event,
                    frame.message().unwrap_or("-")
                );
                match frame.parent_id {
                    Some(parent) if self.reject(parent) => Ok(Effect::Applied),
                    _ => Ok(Effect::Unchanged),
                }
            }
            Status::Request => Ok(Effect::Unchanged),
        }
    }

    /// The server accepted `request_id`; forget its inverse.
    pub fn acknowledge(&mut self, request_id: Uuid) -> bool {
        self.pending.remove(&request_id).is_some()
    }

    /// The server refused `request_id`; undo it. Returns whether anything
    /// was rolled back.
    pub fn reject(&mut self, request_id: Uuid) -> bool {
        let Some(inverse) = self.pending.remove(&request_id) else {
            return false;
        };
        self.rollback(inverse)
    }

    /// Replace the whole board with a fresh snapshot. Pending inverses refer
    /// to the old state and are dropped.
    pub fn reset(&mut self, snapshot: BoardSnapshot) {
        let dropped = self.pending.len();
        *self = Self::from_snapshot(snapshot);
        if dropped > 0 {
            debug!("board {}: resync dropped {dropped} pending changes", self.board_id);
        }
    }

    // -------------------------------------------------------------------------
    // LOCAL
    // -------------------------------------------------------------------------

    fn apply_local(&mut self, op: LocalOp) -> Result<Effect, ReconcileError> {
        let (event, inverse) = match op {
            LocalOp::Add { layer_number, element } => {
                let layer = layer_number.unwrap_or(DEFAULT_LAYER_NUMBER);
                let id = element.id().to_owned();
                let value = element.to_value();
                self.layers.insert(layer, element, None)?;
                let layer_number = i64::try_from(layer).ok();
                let event = ClientEvent::AddElement(AddElement { layer_number, element: value });
                (event, Inverse::Remove { id })
            }
            LocalOp::Update { id, attrs } => {
                let before = self.previous_attrs(&id, &attrs)?;
                let (_, applied) = self.layers.update(&id, &attrs)?;
                let event = ClientEvent::UpdateElement(UpdateElement { id: id.clone(), new_attrs: applied });
                (event, Inverse::Restore { id, attrs: before })
            }
            LocalOp::Remove { id } => {
                let (element, at) = self.layers.remove(&id)?;
                (ClientEvent::RemoveElement(RemoveElement::Id(id)), Inverse::Reinsert { element, at })
            }
            LocalOp::MoveWithinLayer { id, direction } => {
                let moved = self.layers.move_within(&id, direction)?;
                return Ok(self.send_move(id, moved));
            }
            LocalOp::MoveToLayer { id, direction } => {
                let moved = self.layers.move_to_layer(&id, direction)?;
                return Ok(self.send_move(id, moved));
            }
            LocalOp::ChangeLayer { id, change } => {
                let moved = self.layers.change_layer(&id, change)?;
                return Ok(self.send_move(id, moved));
            }
        };
        Ok(self.track(event, inverse))
    }

    /// Moves travel as explicit positions so the server checks them against
    /// its own copy.
    fn send_move(&mut self, id: String, moved: Moved) -> Effect {
        if moved.is_noop() {
            return Effect::Unchanged;
        }
        let change = moved.as_change();
        let event = ClientEvent::ChangeElementLayer(ChangeElementLayer { id: id.clone(), action: change });
        self.track(event, Inverse::Relocate { id, change: change.inverse() })
    }

    fn track(&mut self, event: ClientEvent, inverse: Inverse) -> Effect {
        let outbound = Outbound::new(event);
        self.pending.insert(outbound.request_id, inverse);
        Effect::Send(outbound)
    }

    fn previous_attrs(&self, id: &str, patch: &Attrs) -> Result<Attrs, LayerError> {
        let element = self
            .layers
            .get(id)
            .ok_or_else(|| LayerError::ElementNotFound(id.to_owned()))?;
        let keys = filter_patch(element.kind(), patch);
        Ok(element.snapshot_attrs(keys.keys()))
    }

    // -------------------------------------------------------------------------
    // REMOTE
    // -------------------------------------------------------------------------

    fn apply_remote(&mut self, event: BoardEvent) -> Result<Effect, ReconcileError> {
        match event {
            BoardEvent::Added(ElementAdded { layer_number, index, element }) => {
                if self.layers.contains(element.id()) {
                    return self.settle_local_add(layer_number, index, element).map_err(ReconcileError::from);
                }
                self.layers.check_layer(layer_number)?;
                let len = self.layers.layer(layer_number).map_or(0, <[Element]>::len);
                self.layers.insert(layer_number, element, Some(index.min(len)))?;
                Ok(Effect::Applied)
            }
            BoardEvent::Updated(ElementUpdated { id, new_attrs }) => {
                let Some(current) = self.layers.get(&id) else {
                    debug!("board {}: update for unknown element {id}", self.board_id);
                    return Ok(Effect::Unchanged);
                };
                let (merged, _) = current.merged(&new_attrs).map_err(LayerError::from)?;
                if &merged == current {
                    return Ok(Effect::Unchanged);
                }
                self.layers.update(&id, &new_attrs)?;
                Ok(Effect::Applied)
            }
            BoardEvent::Removed(ElementRemoved { id }) => {
                if !self.layers.contains(&id) {
                    return Ok(Effect::Unchanged);
                }
                self.layers.remove(&id)?;
                Ok(Effect::Applied)
            }
            BoardEvent::Moved(ElementMoved { id, action }) => self.relocate(&id, action).map_err(ReconcileError::from),
        }
    }

    /// A remote add for an id the mirror already holds. When that copy is
    /// only an unconfirmed local add, the server's element wins: it replaces
    /// the local copy and the local add is no longer rolled back. Otherwise
    /// the event is an echo.
    fn settle_local_add(&mut self, layer_number: usize, index: usize, element: Element) -> Result<Effect, LayerError> {
        let request_id = self.pending.iter().find_map(|(request_id, inverse)| match inverse {
            Inverse::Remove { id } if id == element.id() => Some(*request_id),
            _ => None,
        });
        let Some(request_id) = request_id else {
            return Ok(Effect::Unchanged);
        };

        self.layers.check_layer(layer_number)?;
        self.pending.remove(&request_id);
        self.layers.remove(element.id())?;
        let len = self.layers.layer(layer_number).map_or(0, <[Element]>::len);
        debug!("board {}: server copy of {} replaces local add {request_id}", self.board_id, element.id());
        self.layers.insert(layer_number, element, Some(index.min(len)))?;
        Ok(Effect::Applied)
    }

    /// Put `id` where `change` says it ends up.
    ///
    /// Falls back to taking the element from wherever it currently is when
    /// `prev_position` no longer matches the mirror.
    fn relocate(&mut self, id: &str, change: LayerChange) -> Result<Effect, LayerError> {
        let target = change.new_position;
        if self.layers.element_at(target).is_some_and(|e| e.id() == id) {
            return Ok(Effect::Unchanged);
        }
        let Some(current) = self.layers.position_of(id) else {
            debug!("board {}: move for unknown element {id}", self.board_id);
            return Ok(Effect::Unchanged);
        };
        if self.layers.change_layer(id, LayerChange { prev_position: current, new_position: target }).is_ok() {
            return Ok(Effect::Applied);
        }

        // Target index is past the end of the mirror's layer.
        let (element, from) = self.layers.remove(id)?;
        let len = self.layers.layer(target.layer).map_or(0, <[Element]>::len);
        if let Err(e) = self.layers.insert(target.layer, element.clone(), Some(target.index.min(len))) {
            self.layers.insert(from.layer, element, Some(from.index))?;
            return Err(e);
        }
        Ok(Effect::Applied)
    }

    // -------------------------------------------------------------------------
    // ROLLBACK
    // -------------------------------------------------------------------------

    fn rollback(&mut self, inverse: Inverse) -> bool {
        let result = match inverse {
            Inverse::Remove { id } => self.layers.remove(&id).map(|_| true),
            Inverse::Restore { id, attrs } => self.layers.update(&id, &attrs).map(|_| true),
            Inverse::Reinsert { element, at } => {
                if self.layers.contains(element.id()) {
                    Ok(false)
                } else {
                    let len = self.layers.layer(at.layer).map_or(0, <[Element]>::len);
                    self.layers.insert(at.layer, element, Some(at.index.min(len))).map(|_| true)
                }
            }
            Inverse::Relocate { id, change } => self.relocate(&id, change).map(|effect| effect == Effect::Applied),
        };
        match result {
            Ok(changed) => changed,
            Err(e) => {
                warn!("board {}: rollback failed: {e}", self.board_id);
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
