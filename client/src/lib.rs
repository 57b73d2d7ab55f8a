//! Client side of the layerboard realtime protocol.
//!
//! `store::BoardMirror` keeps a local copy of one board and reconciles
//! optimistic local edits with events broadcast by the server. `net` holds
//! the HTTP and websocket adapters that feed it.

pub mod net;
pub mod store;
pub mod types;

pub use net::{ApiClient, NetError, RealtimeSession, resync};
pub use store::{BoardMirror, Change, Effect, LocalOp, Outbound, ReconcileError};
pub use types::{Board, BoardSnapshot, LayerSnapshot, NewBoard};
