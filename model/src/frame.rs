//! Frame: the realtime wire envelope.
//!
//! ARCHITECTURE
//! ============
//! Every websocket message is a Frame. Clients send `request` frames naming
//! an event (`addElement`, ...). The server answers the sender with a `done`
//! or `error` frame correlated through `parent_id`, and notifies the other
//! room members with `event` frames (`elementAdded`, ...).
//!
//! DESIGN
//! ======
//! - `data` is plain JSON; typed payloads live in `crate::event`.
//! - Error frames always carry `statusCode`, `code` and `message` so both
//!   transports report the same taxonomy.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Frame data key for error messages.
pub const FRAME_MESSAGE: &str = "message";

/// Frame data key for grepable error codes.
pub const FRAME_CODE: &str = "code";

/// Frame data key for the HTTP-equivalent status code on error frames.
pub const FRAME_STATUS_CODE: &str = "statusCode";

/// Frame data key for the retryable flag on error frames.
pub const FRAME_RETRYABLE: &str = "retryable";

// =============================================================================
// TYPES
// =============================================================================

/// Lifecycle position of a frame.
///
/// `request → done` or `request → error` for the sender; `event` for peers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Request,
    Done,
    Error,
    Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    #[serde(default)]
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<Uuid>,
    pub event: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub data: Value,
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code, status code and retryable flag for error payloads.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    /// HTTP-equivalent status code.
    fn status_code(&self) -> u16;

    fn retryable(&self) -> bool {
        false
    }
}

/// Error payload shared by error frames and HTTP error bodies.
#[must_use]
pub fn error_payload(err: &(impl ErrorCode + ?Sized)) -> Value {
    json!({
        "status": "error",
        FRAME_STATUS_CODE: err.status_code(),
        FRAME_CODE: err.error_code(),
        FRAME_MESSAGE: err.to_string(),
        FRAME_RETRYABLE: err.retryable(),
    })
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Frame {
    /// Create a request frame.
    pub fn request(event: impl Into<String>, data: Value) -> Self {
        Self::new(event, Status::Request, data)
    }

    /// Create a notification frame for room peers.
    pub fn notify(event: impl Into<String>, data: Value) -> Self {
        Self::new(event, Status::Event, data)
    }

    fn new(event: impl Into<String>, status: Status, data: Value) -> Self {
        Self { id: Uuid::new_v4(), parent_id: None, ts: now_ms(), board_id: None, event: event.into(), status, data }
    }

    /// Successful terminal reply to this request.
    #[must_use]
    pub fn done(&self, data: Value) -> Self {
        self.reply(Status::Done, data)
    }

    /// Structured error reply from a typed error. Terminal.
    #[must_use]
    pub fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Self {
        self.reply(Status::Error, error_payload(err))
    }

    /// Build a reply frame. Inherits `board_id` and `event`.
    fn reply(&self, status: Status, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: Some(self.id),
            ts: now_ms(),
            board_id: self.board_id,
            event: self.event.clone(),
            status,
            data,
        }
    }

    #[must_use]
    pub fn with_board_id(mut self, board_id: Uuid) -> Self {
        self.board_id = Some(board_id);
        self
    }

    /// `statusCode` of an error frame.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.data
            .get(FRAME_STATUS_CODE)
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
    }

    /// `message` of an error frame.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.data.get(FRAME_MESSAGE).and_then(Value::as_str)
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
