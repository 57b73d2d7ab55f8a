//! Board CRUD routes.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ApiError, RequestError, parse_board_id};
use crate::services::board::{self, BoardSnapshot};
use crate::state::AppState;
use crate::store::{BoardRecord, DetachSection, NewBoard};

#[derive(Deserialize)]
pub struct RenameBoardBody {
    pub name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBoardQuery {
    /// `false` keeps the section back-reference (cascading section delete).
    #[serde(default = "default_detach")]
    pub detach_section: bool,
}

fn default_detach() -> bool {
    true
}

/// `POST /boards`: create a board with its layers.
pub async fn create_board(
    State(state): State<AppState>,
    body: Result<Json<NewBoard>, JsonRejection>,
) -> Result<(StatusCode, Json<BoardRecord>), ApiError> {
    let Json(new) = body.map_err(RequestError::from)?;
    let board = board::create_board(&state, new).await?;
    Ok((StatusCode::CREATED, Json(board)))
}

/// `GET /boards/:id`: board plus every layer document.
pub async fn get_board(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BoardSnapshot>, ApiError> {
    let board_id = parse_board_id(&id)?;
    Ok(Json(board::get_board(&state, board_id).await?))
}

/// `PUT /boards/:id/title`
pub async fn rename_board(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<RenameBoardBody>, JsonRejection>,
) -> Result<Json<BoardRecord>, ApiError> {
    let board_id = parse_board_id(&id)?;
    let Json(body) = body.map_err(RequestError::from)?;
    Ok(Json(board::rename_board(&state, board_id, &body.name).await?))
}

/// `DELETE /boards/:id[?detachSection=false]`
pub async fn delete_board(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<DeleteBoardQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let board_id = parse_board_id(&id)?;
    let Query(query) = query.map_err(RequestError::from)?;
    let detach = if query.detach_section { DetachSection::Detach } else { DetachSection::Skip };
    board::delete_board(&state, board_id, detach).await?;
    Ok(Json(json!({ "message": format!("board {board_id} deleted") })))
}

#[cfg(test)]
#[path = "boards_test.rs"]
mod tests;
