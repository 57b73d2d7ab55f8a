//! Ordered layer structure shared by the server and the client mirror.
//!
//! DESIGN
//! ======
//! A board holds a fixed number of layers (0 = bottom). Each layer is an
//! ordered element sequence; sequence position is paint order, so index 0
//! is painted first. Element ids are unique across all layers.
//!
//! The server and the client run these exact primitives, so a position the
//! client computes for a move is the position the server validates.
//!
//! Moves never wrap around: the first/last index of a layer and the
//! first/last layer of the board are terminal and moving past them is a
//! no-op (`Moved::is_noop`).

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::element::{Attrs, Element, ElementError};

// =============================================================================
// TYPES
// =============================================================================

/// Location of an element: layer number plus index within that layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub layer: usize,
    pub index: usize,
}

impl Position {
    #[must_use]
    pub fn new(layer: usize, index: usize) -> Self {
        Self { layer, index }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.layer, self.index)
    }
}

/// Up is toward the front: a higher index within a layer, a higher layer
/// number across layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Query-string form, as accepted by `FromStr`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(format!("invalid direction: {other}")),
        }
    }
}

/// Explicit relocation used on the realtime path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerChange {
    pub prev_position: Position,
    pub new_position: Position,
}

impl LayerChange {
    #[must_use]
    pub fn inverse(self) -> Self {
        Self { prev_position: self.new_position, new_position: self.prev_position }
    }
}

/// Outcome of a move. `from == to` means nothing changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moved {
    pub from: Position,
    pub to: Position,
}

impl Moved {
    fn noop(at: Position) -> Self {
        Self { from: at, to: at }
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }

    /// Layers whose sequences changed, deduplicated.
    #[must_use]
    pub fn touched_layers(&self) -> Vec<usize> {
        if self.is_noop() {
            Vec::new()
        } else if self.from.layer == self.to.layer {
            vec![self.from.layer]
        } else {
            vec![self.from.layer, self.to.layer]
        }
    }

    #[must_use]
    pub fn as_change(&self) -> LayerChange {
        LayerChange { prev_position: self.from, new_position: self.to }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayerError {
    #[error("layer {layer} not found (board has {count} layers)")]
    LayerOutOfRange { layer: i64, count: usize },
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("element id already exists on this board: {0}")]
    DuplicateId(String),
    #[error("position {0} out of range")]
    PositionOutOfRange(Position),
    #[error("position mismatch at {position}: expected {expected}, found {}", .found.as_deref().unwrap_or("nothing"))]
    PositionMismatch { position: Position, expected: String, found: Option<String> },
    #[error(transparent)]
    Element(#[from] ElementError),
}

// =============================================================================
// LAYER SET
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerSet {
    layers: Vec<Vec<Element>>,
}

impl LayerSet {
    #[must_use]
    pub fn with_layer_count(count: usize) -> Self {
        Self { layers: vec![Vec::new(); count] }
    }

    #[must_use]
    pub fn from_layers(layers: Vec<Vec<Element>>) -> Self {
        Self { layers }
    }

    #[must_use]
    pub fn into_layers(self) -> Vec<Vec<Element>> {
        self.layers
    }

    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn layer(&self, layer: usize) -> Option<&[Element]> {
        self.layers.get(layer).map(Vec::as_slice)
    }

    /// Total number of elements across all layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(Vec::is_empty)
    }

    /// Find the layer and index holding `id`.
    #[must_use]
    pub fn position_of(&self, id: &str) -> Option<Position> {
        self.layers.iter().enumerate().find_map(|(layer, elements)| {
            elements
                .iter()
                .position(|e| e.id() == id)
                .map(|index| Position { layer, index })
        })
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.position_of(id).is_some()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Element> {
        let at = self.position_of(id)?;
        self.element_at(at)
    }

    #[must_use]
    pub fn element_at(&self, at: Position) -> Option<&Element> {
        self.layers.get(at.layer)?.get(at.index)
    }

    /// # Errors
    ///
    /// `LayerOutOfRange` when `layer` is not below `layer_count`.
    pub fn check_layer(&self, layer: usize) -> Result<(), LayerError> {
        if layer < self.layers.len() {
            Ok(())
        } else {
            let layer = i64::try_from(layer).unwrap_or(i64::MAX);
            Err(LayerError::LayerOutOfRange { layer, count: self.layers.len() })
        }
    }

    /// Map a requested layer number from the wire, which may be negative,
    /// onto an existing layer.
    ///
    /// # Errors
    ///
    /// `LayerOutOfRange` for anything outside `[0, layer_count)`.
    pub fn resolve_layer(&self, requested: i64) -> Result<usize, LayerError> {
        usize::try_from(requested)
            .ok()
            .filter(|layer| *layer < self.layers.len())
            .ok_or(LayerError::LayerOutOfRange { layer: requested, count: self.layers.len() })
    }

    fn locate(&self, id: &str) -> Result<Position, LayerError> {
        self.position_of(id)
            .ok_or_else(|| LayerError::ElementNotFound(id.to_owned()))
    }

    // -------------------------------------------------------------------------
    // PRIMITIVES
    // -------------------------------------------------------------------------

    /// Insert into `layer`, appending unless `at` names an index.
    ///
    /// # Errors
    ///
    /// `LayerOutOfRange`, `DuplicateId` if the id exists anywhere on the
    /// board, `PositionOutOfRange` if `at` is past the end of the layer.
    pub fn insert(&mut self, layer: usize, element: Element, at: Option<usize>) -> Result<Position, LayerError> {
        self.check_layer(layer)?;
        if self.contains(element.id()) {
            return Err(LayerError::DuplicateId(element.id().to_owned()));
        }
        let elements = &mut self.layers[layer];
        let index = at.unwrap_or(elements.len());
        if index > elements.len() {
            return Err(LayerError::PositionOutOfRange(Position { layer, index }));
        }
        elements.insert(index, element);
        Ok(Position { layer, index })
    }

    /// # Errors
    ///
    /// `ElementNotFound` when no layer holds `id`.
    pub fn remove(&mut self, id: &str) -> Result<(Element, Position), LayerError> {
        let at = self.locate(id)?;
        let element = self.layers[at.layer].remove(at.index);
        Ok((element, at))
    }

    /// Apply a partial update in place, keeping the element's index.
    /// Returns the position and the attribute subset that was applied.
    ///
    /// # Errors
    ///
    /// `ElementNotFound`, or the element's merge error.
    pub fn update(&mut self, id: &str, patch: &Attrs) -> Result<(Position, Attrs), LayerError> {
        let at = self.locate(id)?;
        let (merged, applied) = self.layers[at.layer][at.index].merged(patch)?;
        self.layers[at.layer][at.index] = merged;
        Ok((at, applied))
    }

    /// Swap the element with its neighbour in the same layer.
    ///
    /// # Errors
    ///
    /// `ElementNotFound` when no layer holds `id`.
    pub fn move_within(&mut self, id: &str, direction: Direction) -> Result<Moved, LayerError> {
        let from = self.locate(id)?;
        let len = self.layers[from.layer].len();
        let target = match direction {
            Direction::Up => Some(from.index + 1).filter(|i| *i < len),
            Direction::Down => from.index.checked_sub(1),
        };
        let Some(index) = target else {
            return Ok(Moved::noop(from));
        };
        self.layers[from.layer].swap(from.index, index);
        Ok(Moved { from, to: Position { layer: from.layer, index } })
    }

    /// Move the element into the adjacent layer, keeping its index where the
    /// target layer is long enough and appending otherwise.
    ///
    /// # Errors
    ///
    /// `ElementNotFound` when no layer holds `id`.
    pub fn move_to_layer(&mut self, id: &str, direction: Direction) -> Result<Moved, LayerError> {
        let from = self.locate(id)?;
        let target = match direction {
            Direction::Up => Some(from.layer + 1).filter(|l| *l < self.layers.len()),
            Direction::Down => from.layer.checked_sub(1),
        };
        let Some(layer) = target else {
            return Ok(Moved::noop(from));
        };
        let element = self.layers[from.layer].remove(from.index);
        let index = from.index.min(self.layers[layer].len());
        self.layers[layer].insert(index, element);
        Ok(Moved { from, to: Position { layer, index } })
    }

    /// Relocate `id` from `prev_position` to `new_position`.
    ///
    /// The element at `prev_position` must be `id`; a mismatch means the
    /// caller's view is stale and nothing is changed.
    ///
    /// # Errors
    ///
    /// `LayerOutOfRange` / `PositionOutOfRange` for out-of-bounds positions,
    /// `PositionMismatch` when `prev_position` holds another element.
    pub fn change_layer(&mut self, id: &str, change: LayerChange) -> Result<Moved, LayerError> {
        let LayerChange { prev_position: from, new_position: to } = change;
        self.check_layer(from.layer)?;
        self.check_layer(to.layer)?;

        let found = self.element_at(from).map(|e| e.id().to_owned());
        match found {
            None => return Err(LayerError::PositionOutOfRange(from)),
            Some(found) if found != id => {
                return Err(LayerError::PositionMismatch { position: from, expected: id.to_owned(), found: Some(found) });
            }
            Some(_) => {}
        }

        // Capacity of the target layer once the element has been taken out.
        let capacity = if from.layer == to.layer {
            self.layers[to.layer].len() - 1
        } else {
            self.layers[to.layer].len()
        };
        if to.index > capacity {
            return Err(LayerError::PositionOutOfRange(to));
        }

        let element = self.layers[from.layer].remove(from.index);
        self.layers[to.layer].insert(to.index, element);
        Ok(Moved { from, to })
    }
}

#[cfg(test)]
#[path = "layers_test.rs"]
mod tests;
