//! In-process `BoardStore`.
//!
//! Behaves like `PgStore` for everything the services can observe: section
//! name uniqueness, version checks, the document ceiling, and all-or-nothing
//! multi-layer writes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BoardRecord, BoardStore, DetachSection, LayerRecord, NewBoard, StoreError, encode_layer};

#[derive(Default)]
struct Inner {
    boards: HashMap<Uuid, BoardRecord>,
    layers: HashMap<Uuid, LayerRecord>,
    sections: HashMap<Uuid, Vec<Uuid>>,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    layer_max_bytes: usize,
}

impl MemoryStore {
    #[must_use]
    pub fn new(layer_max_bytes: usize) -> Self {
        Self { inner: Arc::new(RwLock::new(Inner::default())), layer_max_bytes }
    }
}

#[async_trait]
impl BoardStore for MemoryStore {
    async fn insert_board(&self, new: NewBoard, layer_count: usize) -> Result<BoardRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let taken = inner
            .boards
            .values()
            .any(|b| b.section_id == new.section_id && b.name == new.name);
        if taken {
            return Err(StoreError::DuplicateName { section_id: new.section_id, name: new.name });
        }

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let mut layer_ids = Vec::with_capacity(layer_count);
        for layer_number in 0..layer_count {
            let layer_id = Uuid::new_v4();
            layer_ids.push(layer_id);
            inner.layers.insert(
                layer_id,
                LayerRecord {
                    id: layer_id,
                    board_id: id,
                    layer_number: i32::try_from(layer_number).unwrap_or(i32::MAX),
                    elements: Vec::new(),
                    version: 0,
                },
            );
        }

        let board = BoardRecord {
            id,
            name: new.name,
            board_type: new.board_type,
            project_id: new.project_id,
            section_id: new.section_id,
            layer_ids,
            created_at: now,
            updated_at: now,
        };
        inner.sections.entry(board.section_id).or_default().push(id);
        inner.boards.insert(id, board.clone());
        Ok(board)
    }

    async fn board(&self, id: Uuid) -> Result<Option<BoardRecord>, StoreError> {
        Ok(self.inner.read().await.boards.get(&id).cloned())
    }

    async fn rename_board(&self, id: Uuid, name: &str) -> Result<Option<BoardRecord>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(section_id) = inner.boards.get(&id).map(|b| b.section_id) else {
            return Ok(None);
        };
        let taken = inner
            .boards
            .values()
            .any(|b| b.id != id && b.section_id == section_id && b.name == name);
        if taken {
            return Err(StoreError::DuplicateName { section_id, name: name.to_owned() });
        }

        let Some(board) = inner.boards.get_mut(&id) else {
            return Ok(None);
        };
        name.clone_into(&mut board.name);
        board.updated_at = OffsetDateTime::now_utc();
        Ok(Some(board.clone()))
    }

    async fn delete_board(&self, id: Uuid, detach: DetachSection) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(board) = inner.boards.remove(&id) else {
            return Ok(false);
        };
        for layer_id in &board.layer_ids {
            inner.layers.remove(layer_id);
        }
        if detach == DetachSection::Detach {
            if let Some(boards) = inner.sections.get_mut(&board.section_id) {
                boards.retain(|b| *b != id);
            }
        }
        Ok(true)
    }

    async fn layers(&self, layer_ids: &[Uuid]) -> Result<Vec<LayerRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut layers: Vec<LayerRecord> = layer_ids
            .iter()
            .filter_map(|id| inner.layers.get(id).cloned())
            .collect();
        layers.sort_by_key(|l| l.layer_number);
        Ok(layers)
    }

    async fn save_layers(&self, layers: &[LayerRecord]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        // Validate every layer before touching any, so a failure leaves all unchanged.
        for layer in layers {
            let current = inner.layers.get(&layer.id).map(|l| l.version);
            if current != Some(layer.version) {
                return Err(StoreError::Conflict(layer.id));
            }
            encode_layer(layer, self.layer_max_bytes)?;
        }

        for layer in layers {
            let mut saved = layer.clone();
            saved.version += 1;
            inner.layers.insert(layer.id, saved);
        }
        Ok(())
    }

    async fn touch_board(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(board) = self.inner.write().await.boards.get_mut(&id) {
            board.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn section_boards(&self, section_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .sections
            .get(&section_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
