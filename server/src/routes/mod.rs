//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the HTTP API and the realtime websocket endpoint under
//! a single Axum router. Handlers are thin: they parse the request, call a
//! service, broadcast what changed, and shape the response. Errors from any
//! layer become the same JSON body through `ErrorCode`.

pub mod boards;
pub mod elements;
pub mod ws;

use axum::Router;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use model::ErrorCode;
use model::frame::error_payload;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/boards", post(boards::create_board))
        .route("/boards/{id}", get(boards::get_board).delete(boards::delete_board))
        .route("/boards/{id}/title", put(boards::rename_board))
        .route("/boards/{id}/elements", post(elements::add_element))
        .route(
            "/boards/{id}/elements/{element_id}",
            put(elements::update_element).delete(elements::remove_element),
        )
        .route("/boards/{id}/elements/{element_id}/move", put(elements::move_element))
        .route("/boards/{id}/elements/{element_id}/move-to-layer", put(elements::move_element_to_layer))
        .route("/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// ERRORS
// =============================================================================

/// Request-shape failures caught before any service runs.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("malformed board id: {0}")]
    MalformedBoardId(String),
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl ErrorCode for RequestError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedBoardId(_) => "E_MALFORMED_ID",
            Self::InvalidBody(_) => "E_INVALID_BODY",
            Self::InvalidQuery(_) => "E_INVALID_QUERY",
        }
    }

    fn status_code(&self) -> u16 {
        400
    }
}

impl From<JsonRejection> for RequestError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody(rejection.body_text())
    }
}

impl From<QueryRejection> for RequestError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidQuery(rejection.body_text())
    }
}

/// JSON error response built from any `ErrorCode` error.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl<E: ErrorCode> From<E> for ApiError {
    fn from(err: E) -> Self {
        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = err.error_code(), error = %err, "request failed");
        }
        Self { status, body: error_payload(&err) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub(crate) fn parse_board_id(raw: &str) -> Result<Uuid, RequestError> {
    raw.parse()
        .map_err(|_| RequestError::MalformedBoardId(raw.to_owned()))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
