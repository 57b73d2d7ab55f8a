//! Durable board and layer documents.
//!
//! DESIGN
//! ======
//! A board row lists its layer ids in order; each layer row embeds its whole
//! element array. Writes always replace a layer's entire array and are
//! guarded by the layer's `version` column: the writer passes the version it
//! read and the store bumps it. A mismatch means another writer got there
//! first and surfaces as `StoreError::Conflict`.
//!
//! Two backends implement `BoardStore`:
//! - `postgres::PgStore` (production)
//! - `memory::MemoryStore` (tests and `STORE=memory` dev mode)

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use model::Element;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub board_type: String,
    pub project_id: Uuid,
    pub section_id: Uuid,
    /// Ordered bottom to top.
    pub layer_ids: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRecord {
    pub id: Uuid,
    pub board_id: Uuid,
    pub layer_number: i32,
    pub elements: Vec<Element>,
    /// Version as read. `save_layers` expects it unchanged in storage.
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBoard {
    pub project_id: Uuid,
    pub section_id: Uuid,
    pub name: String,
    #[serde(rename = "type", default = "default_board_type")]
    pub board_type: String,
}

fn default_board_type() -> String {
    "board".into()
}

/// Whether deleting a board also removes its section back-reference.
///
/// `Skip` is for cascading deletes where the section itself is going away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetachSection {
    #[default]
    Detach,
    Skip,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a board named {name:?} already exists in section {section_id}")]
    DuplicateName { section_id: Uuid, name: String },
    #[error("layer {0} was modified concurrently")]
    Conflict(Uuid),
    #[error("layer {layer_id} would be {bytes} bytes (limit {limit})")]
    PayloadTooLarge { layer_id: Uuid, bytes: usize, limit: usize },
    #[error("layer document encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl model::ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateName { .. } => "E_DUPLICATE_NAME",
            Self::Conflict(_) => "E_CONFLICT",
            Self::PayloadTooLarge { .. } => "E_PAYLOAD_TOO_LARGE",
            Self::Encode(_) => "E_ENCODE",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn status_code(&self) -> u16 {
        match self {
            Self::DuplicateName { .. } | Self::Conflict(_) => 409,
            Self::PayloadTooLarge { .. } => 413,
            Self::Encode(_) | Self::Database(_) => 500,
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

// =============================================================================
// TRAIT
// =============================================================================

#[async_trait]
pub trait BoardStore: Send + Sync {
    /// Insert a board with `layer_count` empty layers and record it under
    /// its section.
    async fn insert_board(&self, new: NewBoard, layer_count: usize) -> Result<BoardRecord, StoreError>;

    async fn board(&self, id: Uuid) -> Result<Option<BoardRecord>, StoreError>;

    /// `None` when the board does not exist.
    async fn rename_board(&self, id: Uuid, name: &str) -> Result<Option<BoardRecord>, StoreError>;

    /// Delete the board and its layers. Returns `false` when it did not exist.
    async fn delete_board(&self, id: Uuid, detach: DetachSection) -> Result<bool, StoreError>;

    /// Layers for the given ids, ordered by `layer_number`.
    async fn layers(&self, layer_ids: &[Uuid]) -> Result<Vec<LayerRecord>, StoreError>;

    /// Replace the element arrays of `layers` in one atomic write.
    async fn save_layers(&self, layers: &[LayerRecord]) -> Result<(), StoreError>;

    async fn touch_board(&self, id: Uuid) -> Result<(), StoreError>;

    /// Board ids recorded under a section.
    async fn section_boards(&self, section_id: Uuid) -> Result<Vec<Uuid>, StoreError>;
}

/// Serialize a layer's elements, enforcing the document ceiling.
///
/// # Errors
///
/// `PayloadTooLarge` when the encoded array exceeds `limit` bytes.
pub fn encode_layer(layer: &LayerRecord, limit: usize) -> Result<serde_json::Value, StoreError> {
    let bytes = serde_json::to_vec(&layer.elements)?.len();
    if bytes > limit {
        return Err(StoreError::PayloadTooLarge { layer_id: layer.id, bytes, limit });
    }
    Ok(serde_json::to_value(&layer.elements)?)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
