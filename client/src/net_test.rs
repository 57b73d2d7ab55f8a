use super::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

// =============================================================================
// STUB SERVERS
// =============================================================================

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.expect("read request");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .find_map(|line| {
                    line.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Answer exactly one HTTP request; the handle yields the raw request.
async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.expect("write response");
        request
    });
    (format!("http://{addr}"), handle)
}

fn request_line(request: &str) -> &str {
    request.lines().next().unwrap_or_default()
}

fn snapshot_json(board_id: Uuid) -> Value {
    json!({
        "id": board_id,
        "name": "Plan",
        "type": "board",
        "projectId": Uuid::new_v4(),
        "sectionId": Uuid::new_v4(),
        "layerIds": [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()],
        "createdAt": "2026-01-01T00:00:00Z",
        "updatedAt": "2026-01-02T00:00:00Z",
        "layers": [
            {"id": Uuid::new_v4(), "boardId": board_id, "layerNumber": 0, "elements": [], "version": 1},
            {"id": Uuid::new_v4(), "boardId": board_id, "layerNumber": 1, "elements": [], "version": 1},
            {"id": Uuid::new_v4(), "boardId": board_id, "layerNumber": 2, "elements": [
                {"type": "ellipse", "id": "e1", "x": 1, "y": 2}
            ], "version": 4},
        ],
    })
}

// =============================================================================
// URLS
// =============================================================================

#[test]
fn ws_url_follows_the_http_scheme() {
    let board_id = Uuid::new_v4();
    assert_eq!(
        ws_url("http://localhost:3000/", board_id).expect("url"),
        format!("ws://localhost:3000/ws?boardId={board_id}")
    );
    assert_eq!(
        ws_url("https://boards.example.com", board_id).expect("url"),
        format!("wss://boards.example.com/ws?boardId={board_id}")
    );
    assert!(matches!(ws_url("ftp://host", board_id), Err(NetError::InvalidBaseUrl(_))));
}

#[test]
fn api_client_requires_an_http_base() {
    assert!(ApiClient::new("http://127.0.0.1:3000").is_ok());
    assert!(matches!(ApiClient::new("not a url"), Err(NetError::InvalidBaseUrl(_))));
    assert!(matches!(ApiClient::new("mailto:someone@example.com"), Err(NetError::InvalidBaseUrl(_))));
}

// =============================================================================
// HTTP
// =============================================================================

#[tokio::test]
async fn resync_builds_a_mirror_from_the_snapshot() {
    let board_id = Uuid::new_v4();
    let (base, server) = serve_once("200 OK", snapshot_json(board_id).to_string()).await;
    let api = ApiClient::new(&base).expect("client");

    let mirror = resync(&api, board_id).await.expect("resync");
    assert_eq!(mirror.board_id(), board_id);
    assert_eq!(mirror.layers().layer_count(), 3);
    assert_eq!(mirror.layers().position_of("e1"), Some(model::Position::new(2, 0)));

    let request = server.await.expect("server");
    assert_eq!(request_line(&request), format!("GET /boards/{board_id} HTTP/1.1"));
}

#[tokio::test]
async fn error_bodies_become_api_errors() {
    let body = json!({
        "status": "error",
        "statusCode": 409,
        "code": "E_CONFLICT",
        "message": "layer was modified concurrently",
        "retryable": true,
    });
    let (base, _server) = serve_once("409 Conflict", body.to_string()).await;
    let api = ApiClient::new(&base).expect("client");

    let err = api.remove_element(Uuid::new_v4(), "r1").await.unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert!(err.is_retryable());
    match err {
        NetError::Api { code, message, .. } => {
            assert_eq!(code, "E_CONFLICT");
            assert_eq!(message, "layer was modified concurrently");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_json_error_falls_back_to_the_status() {
    let (base, _server) = serve_once("502 Bad Gateway", "upstream down".into()).await;
    let api = ApiClient::new(&base).expect("client");

    let err = api.get_board(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.status(), Some(502));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn element_ids_are_escaped_and_queries_attached() {
    let board_id = Uuid::new_v4();
    let body = json!({"id": "my rect", "from": {"layer": 0, "index": 0}, "to": {"layer": 0, "index": 1}});
    let (base, server) = serve_once("200 OK", body.to_string()).await;
    let api = ApiClient::new(&base).expect("client");

    let relocated = api.move_element(board_id, "my rect", Direction::Up).await.expect("move");
    assert_eq!(relocated.to, model::Position::new(0, 1));

    let request = server.await.expect("server");
    assert_eq!(
        request_line(&request),
        format!("PUT /boards/{board_id}/elements/my%20rect/move?direction=up HTTP/1.1")
    );
}

#[tokio::test]
async fn add_element_posts_raw_element_with_layer_query() {
    let board_id = Uuid::new_v4();
    let element = json!({"type": "ellipse", "id": "e9", "x": 0, "y": 0});
    let placed = json!({"layerNumber": 1, "index": 0, "element": element});
    let (base, server) = serve_once("201 Created", placed.to_string()).await;
    let api = ApiClient::new(&base).expect("client");

    let placed = api.add_element(board_id, Some(1), &element).await.expect("add");
    assert_eq!(placed.layer_number, 1);
    assert_eq!(placed.element.id(), "e9");

    let request = server.await.expect("server");
    assert_eq!(request_line(&request), format!("POST /boards/{board_id}/elements?layerNumber=1 HTTP/1.1"));
    let body = request.split("\r\n\r\n").nth(1).expect("body");
    assert_eq!(serde_json::from_str::<Value>(body).expect("json"), element);
}

// =============================================================================
// REALTIME
// =============================================================================

#[tokio::test]
async fn session_joins_sends_and_receives() {
    let board_id = Uuid::new_v4();
    let client_id = Uuid::new_v4();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(tcp).await.expect("handshake");
        let joined = Frame::notify(SESSION_JOINED, json!({"clientId": client_id, "boardId": board_id}))
            .with_board_id(board_id);
        ws.send(Message::text(serde_json::to_string(&joined).expect("json")))
            .await
            .expect("send joined");

        let request: Frame = loop {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                break serde_json::from_str(text.as_str()).expect("frame");
            }
        };
        let reply = request.done(json!({"id": "r1"}));
        ws.send(Message::text(serde_json::to_string(&reply).expect("json")))
            .await
            .expect("send reply");
        ws.close(None).await.expect("close");
        request
    });

    let mut session = RealtimeSession::connect(&format!("http://{addr}"), board_id)
        .await
        .expect("connect");
    assert_eq!(session.client_id(), client_id);
    assert_eq!(session.board_id(), board_id);

    let mut mirror = BoardMirror::new(board_id, model::LayerSet::with_layer_count(3));
    let element = model::Element::from_value(json!({"type": "ellipse", "id": "r1", "x": 0, "y": 0})).expect("element");
    let crate::store::Effect::Send(outbound) = mirror
        .apply(crate::store::Change::Local(crate::store::LocalOp::Add { layer_number: None, element }))
        .expect("local add")
    else {
        panic!("expected an outbound request");
    };
    session.send(&outbound).await.expect("send");

    let reply = session.next_frame(Duration::from_secs(2)).await.expect("reply");
    assert_eq!(reply.status, Status::Done);
    assert_eq!(reply.parent_id, Some(outbound.request_id));
    mirror.handle_frame(&reply).expect("ack");
    assert_eq!(mirror.pending_count(), 0);

    assert!(matches!(session.next_frame(Duration::from_secs(2)).await, Err(NetError::WsClosed)));

    let received = server.await.expect("server");
    assert_eq!(received.id, outbound.request_id);
    assert_eq!(received.event, model::event::ADD_ELEMENT);
    assert_eq!(received.board_id, Some(board_id));
}

#[tokio::test]
async fn refused_upgrade_reports_the_status() {
    let body = json!({"status": "error", "statusCode": 404, "code": "E_BOARD_NOT_FOUND", "message": "board not found"});
    let (base, _server) = serve_once("404 Not Found", body.to_string()).await;

    let err = RealtimeSession::connect(&base, Uuid::new_v4()).await.err().expect("refused");
    assert_eq!(err.status(), Some(404));
}
