//! Element mutation routes.
//!
//! HTTP requests carry no socket identity, so every successful mutation is
//! broadcast to the whole room. A client that made the change over HTTP and
//! also listens on the realtime channel receives its own change back; the
//! client mirror treats that echo as a no-op.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use model::{Attrs, Direction};
use serde::Deserialize;
use serde_json::Value;

use super::{ApiError, RequestError, parse_board_id};
use crate::services::element::{self, Placed, Relocated, Removed, Updated};
use crate::services::room::Origin;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddElementQuery {
    /// Signed so that a negative layer is a missing layer, not a bad query.
    pub layer_number: Option<i64>,
}

#[derive(Deserialize)]
pub struct MoveQuery {
    pub direction: Direction,
}

/// `POST /boards/:id/elements[?layerNumber=N]`
pub async fn add_element(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<AddElementQuery>, QueryRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Placed>), ApiError> {
    let board_id = parse_board_id(&id)?;
    let Query(query) = query.map_err(RequestError::from)?;
    let Json(data) = body.map_err(RequestError::from)?;

    let placed = element::add_element(&state, board_id, Origin::Http, query.layer_number, data).await?;
    Ok((StatusCode::CREATED, Json(placed)))
}

/// `DELETE /boards/:id/elements/:element_id`
pub async fn remove_element(
    State(state): State<AppState>,
    Path((id, element_id)): Path<(String, String)>,
) -> Result<Json<Removed>, ApiError> {
    let board_id = parse_board_id(&id)?;
    Ok(Json(element::remove_element(&state, board_id, Origin::Http, &element_id).await?))
}

/// `PUT /boards/:id/elements/:element_id`: body is the partial attribute map.
pub async fn update_element(
    State(state): State<AppState>,
    Path((id, element_id)): Path<(String, String)>,
    body: Result<Json<Attrs>, JsonRejection>,
) -> Result<Json<Updated>, ApiError> {
    let board_id = parse_board_id(&id)?;
    let Json(patch) = body.map_err(RequestError::from)?;
    Ok(Json(element::update_element(&state, board_id, Origin::Http, &element_id, &patch).await?))
}

/// `PUT /boards/:id/elements/:element_id/move?direction=up|down`
pub async fn move_element(
    State(state): State<AppState>,
    Path((id, element_id)): Path<(String, String)>,
    query: Result<Query<MoveQuery>, QueryRejection>,
) -> Result<Json<Relocated>, ApiError> {
    let board_id = parse_board_id(&id)?;
    let Query(query) = query.map_err(RequestError::from)?;
    let relocated =
        element::move_element_within_layer(&state, board_id, Origin::Http, &element_id, query.direction).await?;
    Ok(Json(relocated))
}

/// `PUT /boards/:id/elements/:element_id/move-to-layer?direction=up|down`
pub async fn move_element_to_layer(
    State(state): State<AppState>,
    Path((id, element_id)): Path<(String, String)>,
    query: Result<Query<MoveQuery>, QueryRejection>,
) -> Result<Json<Relocated>, ApiError> {
    let board_id = parse_board_id(&id)?;
    let Query(query) = query.map_err(RequestError::from)?;
    let relocated =
        element::move_element_to_layer(&state, board_id, Origin::Http, &element_id, query.direction).await?;
    Ok(Json(relocated))
}

#[cfg(test)]
#[path = "elements_test.rs"]
mod tests;
