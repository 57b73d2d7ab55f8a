use super::*;
use crate::state::test_helpers;
use futures_util::{SinkExt, StreamExt};
use model::event::{ADD_ELEMENT, CHANGE_ELEMENT_LAYER, ELEMENT_ADDED, ELEMENT_MOVED, REMOVE_ELEMENT, UPDATE_ELEMENT};
use model::frame::FRAME_CODE;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite;

async fn recv_board_broadcast(rx: &mut mpsc::Receiver<Frame>) -> Frame {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("broadcast receive timed out")
        .expect("broadcast channel closed unexpectedly")
}

async fn assert_no_board_broadcast(rx: &mut mpsc::Receiver<Frame>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no broadcast frame"
    );
}

fn request_text(event: &str, data: Value) -> (Uuid, String) {
    let frame = Frame::request(event, data);
    (frame.id, serde_json::to_string(&frame).expect("serialize"))
}

// =============================================================================
// FRAME PROCESSING
// =============================================================================

#[tokio::test]
async fn add_element_replies_done_and_broadcasts_to_peers_only() {
    let state = test_helpers::test_app_state();
    let board = test_helpers::seed_board(&state).await;
    let (sender, mut sender_rx) = test_helpers::join_room(&state, board.id).await;
    let (_peer, mut peer_rx) = test_helpers::join_room(&state, board.id).await;

    let (req_id, text) =
        request_text(ADD_ELEMENT, json!({"layerNumber": 1, "element": test_helpers::rect_json("r1")}));
    let replies = process_inbound_text(&state, board.id, sender, &text).await;

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].status, Status::Done);
    assert_eq!(replies[0].parent_id, Some(req_id));
    assert_eq!(replies[0].data["layerNumber"], 1);

    let event = recv_board_broadcast(&mut peer_rx).await;
    assert_eq!(event.event, ELEMENT_ADDED);
    assert_eq!(event.status, Status::Event);
    assert_eq!(event.data["element"]["id"], "r1");
    assert_no_board_broadcast(&mut sender_rx).await;
}

#[tokio::test]
async fn failures_go_to_sender_only() {
    let state = test_helpers::test_app_state();
    let board = test_helpers::seed_board(&state).await;
    let (sender, _sender_rx) = test_helpers::join_room(&state, board.id).await;
    let (_peer, mut peer_rx) = test_helpers::join_room(&state, board.id).await;

    let (req_id, text) = request_text(REMOVE_ELEMENT, json!("ghost"));
    let replies = process_inbound_text(&state, board.id, sender, &text).await;

    assert_eq!(replies[0].status, Status::Error);
    assert_eq!(replies[0].parent_id, Some(req_id));
    assert_eq!(replies[0].status_code(), Some(404));
    assert_eq!(replies[0].data[FRAME_CODE], "E_ELEMENT_NOT_FOUND");
    assert_no_board_broadcast(&mut peer_rx).await;
}

#[tokio::test]
async fn negative_layer_is_a_missing_layer() {
    let state = test_helpers::test_app_state();
    let board = test_helpers::seed_board(&state).await;
    let (sender, _sender_rx) = test_helpers::join_room(&state, board.id).await;
    let (_peer, mut peer_rx) = test_helpers::join_room(&state, board.id).await;

    let (req_id, text) =
        request_text(ADD_ELEMENT, json!({"layerNumber": -1, "element": test_helpers::rect_json("r1")}));
    let replies = process_inbound_text(&state, board.id, sender, &text).await;

    assert_eq!(replies[0].parent_id, Some(req_id));
    assert_eq!(replies[0].status_code(), Some(404));
    assert_eq!(replies[0].data[FRAME_CODE], "E_LAYER_NOT_FOUND");
    assert_no_board_broadcast(&mut peer_rx).await;
}

#[tokio::test]
async fn bad_shapes_are_rejected_with_400() {
    let state = test_helpers::test_app_state();
    let board = test_helpers::seed_board(&state).await;
    let client_id = Uuid::new_v4();

    let replies = process_inbound_text(&state, board.id, client_id, "{not json").await;
    assert_eq!(replies[0].status_code(), Some(400));
    assert_eq!(replies[0].data[FRAME_CODE], "E_INVALID_FRAME");

    let (_, text) = request_text("dropTable", Value::Null);
    let replies = process_inbound_text(&state, board.id, client_id, &text).await;
    assert_eq!(replies[0].data[FRAME_CODE], "E_UNKNOWN_EVENT");

    let (_, text) = request_text(UPDATE_ELEMENT, json!({"id": "r1"}));
    let replies = process_inbound_text(&state, board.id, client_id, &text).await;
    assert_eq!(replies[0].status_code(), Some(400));
    assert_eq!(replies[0].data[FRAME_CODE], "E_MALFORMED_EVENT");
}

#[tokio::test]
async fn change_layer_broadcasts_move_and_rejects_stale_position() {
    let state = test_helpers::test_app_state();
    let board = test_helpers::seed_board(&state).await;
    element::add_element(&state, board.id, Origin::Http, Some(0), test_helpers::rect_json("a")).await.expect("add");
    let (sender, _sender_rx) = test_helpers::join_room(&state, board.id).await;
    let (_peer, mut peer_rx) = test_helpers::join_room(&state, board.id).await;

    let action = json!({"prevPosition": {"layer": 0, "index": 0}, "newPosition": {"layer": 2, "index": 0}});
    let (_, text) = request_text(CHANGE_ELEMENT_LAYER, json!({"id": "a", "action": action}));
    let replies = process_inbound_text(&state, board.id, sender, &text).await;
    assert_eq!(replies[0].status, Status::Done);

    let moved = recv_board_broadcast(&mut peer_rx).await;
    assert_eq!(moved.event, ELEMENT_MOVED);
    assert_eq!(moved.data["action"], action);

    // Same request again: the element is no longer at 0:0.
    let (_, text) = request_text(CHANGE_ELEMENT_LAYER, json!({"id": "a", "action": action}));
    let replies = process_inbound_text(&state, board.id, sender, &text).await;
    assert_eq!(replies[0].status_code(), Some(400));
    assert_no_board_broadcast(&mut peer_rx).await;
}

#[tokio::test]
async fn same_position_change_is_acknowledged_without_broadcast() {
    let state = test_helpers::test_app_state();
    let board = test_helpers::seed_board(&state).await;
    element::add_element(&state, board.id, Origin::Http, Some(1), test_helpers::rect_json("a")).await.expect("add");
    let (sender, _sender_rx) = test_helpers::join_room(&state, board.id).await;
    let (_peer, mut peer_rx) = test_helpers::join_room(&state, board.id).await;

    let action = json!({"prevPosition": {"layer": 1, "index": 0}, "newPosition": {"layer": 1, "index": 0}});
    let (_, text) = request_text(CHANGE_ELEMENT_LAYER, json!({"id": "a", "action": action}));
    let replies = process_inbound_text(&state, board.id, sender, &text).await;

    assert_eq!(replies[0].status, Status::Done);
    assert_no_board_broadcast(&mut peer_rx).await;
}

// =============================================================================
// END TO END
// =============================================================================

type Socket = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(addr: std::net::SocketAddr, board_id: Uuid) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?boardId={board_id}"))
        .await
        .expect("ws connect");
    socket
}

async fn next_frame(socket: &mut Socket) -> Frame {
    loop {
        let msg = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("ws receive timed out")
            .expect("ws stream ended")
            .expect("ws error");
        if let tungstenite::Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("frame json");
        }
    }
}

#[tokio::test]
async fn upgrade_requires_a_known_board() {
    let state = test_helpers::test_app_state();
    let addr = test_helpers::spawn_app(state).await;
    let client = reqwest::Client::new();

    let missing = client.get(format!("http://{addr}/ws")).send().await.expect("request");
    assert_eq!(missing.status(), reqwest::StatusCode::BAD_REQUEST);

    let malformed = client.get(format!("http://{addr}/ws?boardId=xyz")).send().await.expect("request");
    assert_eq!(malformed.status(), reqwest::StatusCode::BAD_REQUEST);

    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?boardId={}", Uuid::new_v4()))
        .await
        .unwrap_err();
    match err {
        tungstenite::Error::Http(res) => assert_eq!(res.status(), 404),
        other => panic!("expected http error, got {other:?}"),
    }
}

#[tokio::test]
async fn two_sockets_see_each_others_changes_but_not_their_own() {
    let state = test_helpers::test_app_state();
    let board = test_helpers::seed_board(&state).await;
    let addr = test_helpers::spawn_app(state).await;

    let mut alice = connect(addr, board.id).await;
    let mut bob = connect(addr, board.id).await;

    let joined = next_frame(&mut alice).await;
    assert_eq!(joined.event, SESSION_JOINED);
    assert_eq!(joined.data["boardId"], json!(board.id));
    next_frame(&mut bob).await;

    let req = Frame::request(ADD_ELEMENT, json!({"element": test_helpers::rect_json("r1")}));
    alice
        .send(tungstenite::Message::text(serde_json::to_string(&req).expect("serialize")))
        .await
        .expect("send");

    let done = next_frame(&mut alice).await;
    assert_eq!(done.status, Status::Done);
    assert_eq!(done.parent_id, Some(req.id));
    assert_eq!(done.data["layerNumber"], 2);

    let added = next_frame(&mut bob).await;
    assert_eq!(added.event, ELEMENT_ADDED);
    assert_eq!(added.data["index"], 0);

    // HTTP changes reach both sockets, including the one that might have made them.
    reqwest::Client::new()
        .delete(format!("http://{addr}/boards/{}/elements/r1", board.id))
        .send()
        .await
        .expect("request");
    assert_eq!(next_frame(&mut alice).await.data["id"], "r1");
    assert_eq!(next_frame(&mut bob).await.data["id"], "r1");
}

#[tokio::test]
async fn deleting_the_board_disconnects_its_sockets() {
    let state = test_helpers::test_app_state();
    let board = test_helpers::seed_board(&state).await;
    let addr = test_helpers::spawn_app(state).await;
    let mut socket = connect(addr, board.id).await;
    next_frame(&mut socket).await;

    reqwest::Client::new()
        .delete(format!("http://{addr}/boards/{}", board.id))
        .send()
        .await
        .expect("request");

    let end = timeout(Duration::from_secs(2), async {
        loop {
            match socket.next().await {
                None | Some(Err(_) | Ok(tungstenite::Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(end.is_ok(), "socket should close after board deletion");
}
