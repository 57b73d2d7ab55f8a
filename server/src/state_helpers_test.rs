use super::*;
use crate::store::{BoardRecord, MemoryStore, NewBoard};
use model::Element;
use serde_json::json;

/// `AppState` over a fresh `MemoryStore` with default config.
#[must_use]
pub fn test_app_state() -> AppState {
    test_app_state_with(ServerConfig::default())
}

#[must_use]
pub fn test_app_state_with(config: ServerConfig) -> AppState {
    let store = MemoryStore::new(config.layer_max_bytes);
    AppState::new(Arc::new(store), config)
}

/// Create an empty board and return it.
pub async fn seed_board(state: &AppState) -> BoardRecord {
    let new = NewBoard {
        project_id: Uuid::new_v4(),
        section_id: Uuid::new_v4(),
        name: format!("board-{}", Uuid::new_v4()),
        board_type: "board".into(),
    };
    state
        .store
        .insert_board(new, state.config.board_layer_count)
        .await
        .expect("seed board")
}

/// Register a fake socket in the board's room.
pub async fn join_room(state: &AppState, board_id: Uuid) -> (Uuid, mpsc::Receiver<Frame>) {
    let client_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(16);
    state
        .rooms
        .write()
        .await
        .entry(board_id)
        .or_default()
        .clients
        .insert(client_id, tx);
    (client_id, rx)
}

#[must_use]
pub fn rect_json(id: &str) -> serde_json::Value {
    json!({"type": "rect", "id": id, "x": 10, "y": 20, "width": 100, "height": 50, "fill": "#ff0000"})
}

#[must_use]
pub fn rect(id: &str) -> Element {
    Element::from_value(rect_json(id)).expect("valid rect")
}

/// Serve the full router on an ephemeral local port.
pub async fn spawn_app(state: AppState) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let app = crate::routes::app(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    addr
}
