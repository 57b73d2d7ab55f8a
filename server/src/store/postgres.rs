//! Postgres `BoardStore` backed by sqlx.
//!
//! Layer documents embed their elements as a `JSONB` array. Multi-row writes
//! (board creation, multi-layer saves) run in one transaction; dropping the
//! transaction on an early return rolls it back.

use async_trait::async_trait;
use model::Element;
use sqlx::PgPool;
use sqlx::types::Json;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use super::{BoardRecord, BoardStore, DetachSection, LayerRecord, NewBoard, StoreError, encode_layer};

const UNIQUE_VIOLATION: &str = "23505";
/// "program limit exceeded", raised for oversized `JSONB` values.
const PROGRAM_LIMIT_EXCEEDED: &str = "54000";

type BoardRow = (Uuid, String, String, Uuid, Uuid, Vec<Uuid>, OffsetDateTime, OffsetDateTime);

const BOARD_COLUMNS: &str = "id, name, board_type, project_id, section_id, layer_ids, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    layer_max_bytes: usize,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool, layer_max_bytes: usize) -> Self {
        Self { pool, layer_max_bytes }
    }
}

fn board_from_row(row: BoardRow) -> BoardRecord {
    let (id, name, board_type, project_id, section_id, layer_ids, created_at, updated_at) = row;
    BoardRecord { id, name, board_type, project_id, section_id, layer_ids, created_at, updated_at }
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

fn duplicate_name_or(err: sqlx::Error, section_id: Uuid, name: &str) -> StoreError {
    if sqlstate(&err).as_deref() == Some(UNIQUE_VIOLATION) {
        StoreError::DuplicateName { section_id, name: name.to_owned() }
    } else {
        StoreError::Database(err)
    }
}

#[async_trait]
impl BoardStore for PgStore {
    async fn insert_board(&self, new: NewBoard, layer_count: usize) -> Result<BoardRecord, StoreError> {
        let id = Uuid::new_v4();
        let layer_ids: Vec<Uuid> = (0..layer_count).map(|_| Uuid::new_v4()).collect();

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, BoardRow>(&format!(
            "INSERT INTO boards (id, name, board_type, project_id, section_id, layer_ids)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {BOARD_COLUMNS}"
        ))
        .bind(id)
        .bind(&new.name)
        .bind(&new.board_type)
        .bind(new.project_id)
        .bind(new.section_id)
        .bind(&layer_ids)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| duplicate_name_or(e, new.section_id, &new.name))?;

        for (layer_number, layer_id) in layer_ids.iter().enumerate() {
            sqlx::query("INSERT INTO board_layers (id, board_id, layer_number) VALUES ($1, $2, $3)")
                .bind(layer_id)
                .bind(id)
                .bind(i32::try_from(layer_number).unwrap_or(i32::MAX))
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("INSERT INTO section_boards (section_id, board_id) VALUES ($1, $2)")
            .bind(new.section_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(board_from_row(row))
    }

    async fn board(&self, id: Uuid) -> Result<Option<BoardRecord>, StoreError> {
        let row = sqlx::query_as::<_, BoardRow>(&format!("SELECT {BOARD_COLUMNS} FROM boards WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(board_from_row))
    }

    async fn rename_board(&self, id: Uuid, name: &str) -> Result<Option<BoardRecord>, StoreError> {
        let result = sqlx::query_as::<_, BoardRow>(&format!(
            "UPDATE boards SET name = $2, updated_at = now() WHERE id = $1 RETURNING {BOARD_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.map(board_from_row)),
            Err(e) if sqlstate(&e).as_deref() == Some(UNIQUE_VIOLATION) => {
                let section_id = self.board(id).await?.map_or(Uuid::nil(), |b| b.section_id);
                Err(StoreError::DuplicateName { section_id, name: name.to_owned() })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_board(&self, id: Uuid, detach: DetachSection) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let section_id = sqlx::query_scalar::<_, Uuid>("DELETE FROM boards WHERE id = $1 RETURNING section_id")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(section_id) = section_id else {
            return Ok(false);
        };

        // Layers go with the board via ON DELETE CASCADE.
        if detach == DetachSection::Detach {
            sqlx::query("DELETE FROM section_boards WHERE section_id = $1 AND board_id = $2")
                .bind(section_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn layers(&self, layer_ids: &[Uuid]) -> Result<Vec<LayerRecord>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, i32, Json<Vec<Element>>, i64)>(
            "SELECT id, board_id, layer_number, elements, version
             FROM board_layers
             WHERE id = ANY($1)
             ORDER BY layer_number ASC",
        )
        .bind(layer_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, board_id, layer_number, Json(elements), version)| LayerRecord {
                id,
                board_id,
                layer_number,
                elements,
                version,
            })
            .collect())
    }

    async fn save_layers(&self, layers: &[LayerRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for layer in layers {
            let document = encode_layer(layer, self.layer_max_bytes)?;
            let result = sqlx::query(
                "UPDATE board_layers SET elements = $2, version = version + 1
                 WHERE id = $1 AND version = $3",
            )
            .bind(layer.id)
            .bind(&document)
            .bind(layer.version)
            .execute(&mut *tx)
            .await;

            let done = match result {
                Ok(done) => done,
                Err(e) if sqlstate(&e).as_deref() == Some(PROGRAM_LIMIT_EXCEEDED) => {
                    warn!(layer_id = %layer.id, "layer document rejected by database size limit");
                    return Err(StoreError::PayloadTooLarge {
                        layer_id: layer.id,
                        bytes: document.to_string().len(),
                        limit: self.layer_max_bytes,
                    });
                }
                Err(e) => return Err(e.into()),
            };
            if done.rows_affected() == 0 {
                return Err(StoreError::Conflict(layer.id));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn touch_board(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE boards SET updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn section_boards(&self, section_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT board_id FROM section_boards WHERE section_id = $1 ORDER BY board_id")
            .bind(section_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

#[cfg(all(test, feature = "live-db-tests"))]
#[path = "postgres_test.rs"]
mod tests;
