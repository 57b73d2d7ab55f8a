//! Typed realtime events carried inside frames.
//!
//! DESIGN
//! ======
//! Frames name their payload with a string (`event`) and carry loose JSON.
//! This module turns that pair into closed enums so the gateway and the
//! client match exhaustively instead of branching on strings:
//!
//! - `ClientEvent`: what a client asks the server to do.
//! - `BoardEvent`: what the server tells the other room members happened.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::element::{Attrs, Element};
use crate::frame::Frame;
use crate::layers::LayerChange;

// =============================================================================
// EVENT NAMES
// =============================================================================

pub const ADD_ELEMENT: &str = "addElement";
pub const UPDATE_ELEMENT: &str = "updateElement";
pub const REMOVE_ELEMENT: &str = "removeElement";
pub const CHANGE_ELEMENT_LAYER: &str = "changeElementLayer";

pub const ELEMENT_ADDED: &str = "elementAdded";
pub const ELEMENT_UPDATED: &str = "elementUpdated";
pub const ELEMENT_REMOVED: &str = "elementRemoved";
pub const ELEMENT_MOVED: &str = "elementMoved";

/// Sent once to a socket after it joined its board room.
pub const SESSION_JOINED: &str = "session:joined";

/// Default target layer for `addElement` when none is given.
pub const DEFAULT_LAYER_NUMBER: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("malformed {event} payload: {message}")]
    Malformed { event: String, message: String },
}

fn decode<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, EventError> {
    serde_json::from_value(data).map_err(|e| EventError::Malformed { event: event.to_owned(), message: e.to_string() })
}

fn encode<T: Serialize>(payload: &T) -> Value {
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

// =============================================================================
// CLIENT → SERVER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_number: Option<i64>,
    /// Raw element JSON; the server builds the typed variant.
    pub element: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateElement {
    pub id: String,
    pub new_attrs: Attrs,
}

/// `removeElement` accepts either a bare id or `{ "id": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoveElement {
    Id(String),
    Object { id: String },
}

impl RemoveElement {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) | Self::Object { id } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeElementLayer {
    pub id: String,
    pub action: LayerChange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    AddElement(AddElement),
    UpdateElement(UpdateElement),
    RemoveElement(RemoveElement),
    ChangeElementLayer(ChangeElementLayer),
}

impl ClientEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddElement(_) => ADD_ELEMENT,
            Self::UpdateElement(_) => UPDATE_ELEMENT,
            Self::RemoveElement(_) => REMOVE_ELEMENT,
            Self::ChangeElementLayer(_) => CHANGE_ELEMENT_LAYER,
        }
    }

    /// Validate an inbound `(event, data)` pair.
    ///
    /// # Errors
    ///
    /// `UnknownEvent` for names outside the client vocabulary, `Malformed`
    /// when the payload does not have the event's shape.
    pub fn parse(event: &str, data: Value) -> Result<Self, EventError> {
        match event {
            ADD_ELEMENT => decode(event, data).map(Self::AddElement),
            UPDATE_ELEMENT => decode(event, data).map(Self::UpdateElement),
            REMOVE_ELEMENT => decode(event, data).map(Self::RemoveElement),
            CHANGE_ELEMENT_LAYER => decode(event, data).map(Self::ChangeElementLayer),
            other => Err(EventError::UnknownEvent(other.to_owned())),
        }
    }

    #[must_use]
    pub fn to_data(&self) -> Value {
        match self {
            Self::AddElement(p) => encode(p),
            Self::UpdateElement(p) => encode(p),
            Self::RemoveElement(p) => encode(p),
            Self::ChangeElementLayer(p) => encode(p),
        }
    }

    #[must_use]
    pub fn to_frame(&self, board_id: Uuid) -> Frame {
        Frame::request(self.name(), self.to_data()).with_board_id(board_id)
    }
}

// =============================================================================
// SERVER → ROOM PEERS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementAdded {
    pub layer_number: usize,
    pub index: usize,
    pub element: Element,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementUpdated {
    pub id: String,
    /// Only the attributes that were actually applied.
    pub new_attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRemoved {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementMoved {
    pub id: String,
    pub action: LayerChange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    Added(ElementAdded),
    Updated(ElementUpdated),
    Removed(ElementRemoved),
    Moved(ElementMoved),
}

impl BoardEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Added(_) => ELEMENT_ADDED,
            Self::Updated(_) => ELEMENT_UPDATED,
            Self::Removed(_) => ELEMENT_REMOVED,
            Self::Moved(_) => ELEMENT_MOVED,
        }
    }

    /// # Errors
    ///
    /// `UnknownEvent` for names outside the broadcast vocabulary,
    /// `Malformed` when the payload does not match.
    pub fn parse(event: &str, data: Value) -> Result<Self, EventError> {
        match event {
            ELEMENT_ADDED => decode(event, data).map(Self::Added),
            ELEMENT_UPDATED => decode(event, data).map(Self::Updated),
            ELEMENT_REMOVED => decode(event, data).map(Self::Removed),
            ELEMENT_MOVED => decode(event, data).map(Self::Moved),
            other => Err(EventError::UnknownEvent(other.to_owned())),
        }
    }

    #[must_use]
    pub fn to_data(&self) -> Value {
        match self {
            Self::Added(p) => encode(p),
            Self::Updated(p) => encode(p),
            Self::Removed(p) => encode(p),
            Self::Moved(p) => encode(p),
        }
    }

    #[must_use]
    pub fn to_frame(&self, board_id: Uuid) -> Frame {
        Frame::notify(self.name(), self.to_data()).with_board_id(board_id)
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
