//! Response shapes of the board HTTP API.

use model::{Attrs, Element, Position};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBoard {
    pub project_id: Uuid,
    pub section_id: Uuid,
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub board_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub board_type: String,
    pub project_id: Uuid,
    pub section_id: Uuid,
    pub layer_ids: Vec<Uuid>,
    /// RFC 3339.
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSnapshot {
    pub id: Uuid,
    pub layer_number: i32,
    pub elements: Vec<Element>,
    pub version: i64,
}

/// `GET /boards/:id`: the board plus every layer document, bottom first.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BoardSnapshot {
    #[serde(flatten)]
    pub board: Board,
    pub layers: Vec<LayerSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placed {
    pub layer_number: usize,
    pub index: usize,
    pub element: Element,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Removed {
    pub message: String,
    pub id: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Updated {
    pub element: Element,
    pub new_attrs: Attrs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Relocated {
    pub from: Position,
    pub to: Position,
}

/// Error body shared by every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
}
