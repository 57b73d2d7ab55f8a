//! Shared board model and realtime wire types.
//!
//! This crate owns everything the `server` and `client` must agree on: the
//! element variants, the ordered layer structure with its move semantics,
//! and the frame/event vocabulary of the per-board realtime channel. It has
//! no transport or storage dependencies.

pub mod element;
pub mod event;
pub mod frame;
pub mod layers;

pub use element::{Attrs, BaseAttrs, Element, ElementError, ElementKind, filter_patch, permitted_fields};
pub use event::{BoardEvent, ClientEvent, EventError};
pub use frame::{ErrorCode, Frame, Status};
pub use layers::{Direction, LayerChange, LayerError, LayerSet, Moved, Position};
