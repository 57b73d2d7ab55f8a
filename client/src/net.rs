//! HTTP and websocket adapters for the board API.
//!
//! `ApiClient` wraps the request/response routes. `RealtimeSession` holds one
//! board's websocket: it waits for `session:joined` on connect and then
//! exchanges JSON `Frame`s. After (re)connecting, callers rebuild their mirror
//! with `resync`; the server keeps no per-client history to replay.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use model::event::SESSION_JOINED;
use model::{Attrs, Direction, Frame, Status};
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use crate::store::{BoardMirror, Outbound};
use crate::types::{Board, BoardSnapshot, ErrorBody, NewBoard, Placed, Relocated, Removed, Updated};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status} {code}: {message}")]
    Api { status: u16, code: String, message: String, retryable: bool },
    #[error("websocket connect failed: {0}")]
    WsConnect(Box<tungstenite::Error>),
    #[error("websocket closed")]
    WsClosed,
    #[error("timed out waiting for websocket frame")]
    Timeout,
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl NetError {
    /// Status of an API error, including a refused websocket upgrade.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().as_ref().map(reqwest::StatusCode::as_u16),
            _ => None,
        }
    }

    /// Whether repeating the same request may succeed (a version conflict).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Api { retryable: true, .. })
    }

    fn from_ws(error: tungstenite::Error) -> Self {
        match error {
            tungstenite::Error::Http(response) => {
                let status = response.status().as_u16();
                let body = response
                    .body()
                    .as_deref()
                    .and_then(|bytes| serde_json::from_slice::<ErrorBody>(bytes).ok());
                match body {
                    Some(body) => {
                        Self::Api { status, code: body.code, message: body.message, retryable: body.retryable }
                    }
                    None => Self::Api { status, code: String::new(), message: "upgrade refused".into(), retryable: false },
                }
            }
            other => Self::WsConnect(Box::new(other)),
        }
    }
}

// =============================================================================
// HTTP
// =============================================================================

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// # Errors
    ///
    /// `InvalidBaseUrl` unless `base_url` is an `http://` or `https://` URL.
    pub fn new(base_url: &str) -> Result<Self, NetError> {
        let parsed = Url::parse(base_url).map_err(|_| NetError::InvalidBaseUrl(base_url.to_owned()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(NetError::InvalidBaseUrl(base_url.to_owned()));
        }
        Ok(Self { http: reqwest::Client::new(), base_url: parsed })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL extended with escaped path segments.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send one request and decode the JSON response, turning non-2xx
    /// statuses into `NetError::Api`.
    ///
    /// # Errors
    ///
    /// Transport failures, API errors and undecodable bodies.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&(impl Serialize + ?Sized)>,
    ) -> Result<T, NetError> {
        let mut request = self.http.request(method, self.url(segments));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        decode(response).await
    }

    /// # Errors
    ///
    /// `Api` when the server does not answer 2xx.
    pub async fn health(&self) -> Result<(), NetError> {
        let response = self.http.get(self.url(&["healthz"])).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetError::Api {
                status: status.as_u16(),
                code: String::new(),
                message: "health check failed".into(),
                retryable: false,
            });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// 409 when the section already has a board with this name.
    pub async fn create_board(&self, board: &NewBoard) -> Result<Board, NetError> {
        self.request(Method::POST, &["boards"], &[], Some(board)).await
    }

    /// Full snapshot: board plus every layer.
    ///
    /// # Errors
    ///
    /// 404 for an unknown board.
    pub async fn get_board(&self, board_id: Uuid) -> Result<BoardSnapshot, NetError> {
        self.request(Method::GET, &["boards", &board_id.to_string()], &[], None::<&Value>).await
    }

    /// # Errors
    ///
    /// 404 for an unknown board, 400 for an empty name.
    pub async fn rename_board(&self, board_id: Uuid, name: &str) -> Result<Board, NetError> {
        let body = json!({ "name": name });
        self.request(Method::PUT, &["boards", &board_id.to_string(), "title"], &[], Some(&body)).await
    }

    /// # Errors
    ///
    /// 404 for an unknown board.
    pub async fn delete_board(&self, board_id: Uuid, detach_section: bool) -> Result<Value, NetError> {
        let query = [("detachSection", detach_section.to_string())];
        self.request(Method::DELETE, &["boards", &board_id.to_string()], &query, None::<&Value>).await
    }

    /// # Errors
    ///
    /// 400 for a duplicate id or an invalid element, 404 for an unknown board
    /// or layer, 413 when the layer would outgrow its size limit.
    pub async fn add_element(
        &self,
        board_id: Uuid,
        layer_number: Option<usize>,
        element: &Value,
    ) -> Result<Placed, NetError> {
        let query: Vec<(&str, String)> = layer_number
            .map(|layer| ("layerNumber", layer.to_string()))
            .into_iter()
            .collect();
        self.request(Method::POST, &["boards", &board_id.to_string(), "elements"], &query, Some(element))
            .await
    }

    /// # Errors
    ///
    /// 404 for an unknown element, 400 when no attribute is permitted.
    pub async fn update_element(&self, board_id: Uuid, element_id: &str, attrs: &Attrs) -> Result<Updated, NetError> {
        let segments = ["boards", &board_id.to_string(), "elements", element_id];
        self.request(Method::PUT, &segments, &[], Some(attrs)).await
    }

    /// # Errors
    ///
    /// 404 for an unknown element.
    pub async fn remove_element(&self, board_id: Uuid, element_id: &str) -> Result<Removed, NetError> {
        let segments = ["boards", &board_id.to_string(), "elements", element_id];
        self.request(Method::DELETE, &segments, &[], None::<&Value>).await
    }

    /// # Errors
    ///
    /// 404 for an unknown element.
    pub async fn move_element(
        &self,
        board_id: Uuid,
        element_id: &str,
        direction: Direction,
    ) -> Result<Relocated, NetError> {
        let segments = ["boards", &board_id.to_string(), "elements", element_id, "move"];
        self.request(Method::PUT, &segments, &[("direction", direction.as_str().to_owned())], None::<&Value>)
            .await
    }

    /// # Errors
    ///
    /// 404 for an unknown element.
    pub async fn move_element_to_layer(
        &self,
        board_id: Uuid,
        element_id: &str,
        direction: Direction,
    ) -> Result<Relocated, NetError> {
        let segments = ["boards", &board_id.to_string(), "elements", element_id, "move-to-layer"];
        self.request(Method::PUT, &segments, &[("direction", direction.as_str().to_owned())], None::<&Value>)
            .await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, NetError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if status.is_success() {
        return Ok(serde_json::from_slice(&bytes)?);
    }

    let body = serde_json::from_slice::<ErrorBody>(&bytes).ok();
    let (code, message, retryable) = match body {
        Some(body) => (body.code, body.message, body.retryable),
        None => (String::new(), status.canonical_reason().unwrap_or("request failed").to_owned(), false),
    };
    Err(NetError::Api { status: status.as_u16(), code, message, retryable })
}

/// Fetch a fresh snapshot and build a mirror from it.
///
/// # Errors
///
/// Whatever `get_board` returns.
pub async fn resync(api: &ApiClient, board_id: Uuid) -> Result<BoardMirror, NetError> {
    let snapshot = api.get_board(board_id).await?;
    debug!("board {board_id}: resynced {} layers", snapshot.layers.len());
    Ok(BoardMirror::from_snapshot(snapshot))
}

// =============================================================================
// REALTIME
// =============================================================================

/// Websocket URL of a board's realtime channel.
///
/// # Errors
///
/// `InvalidBaseUrl` unless `base_url` starts with `http://` or `https://`.
pub fn ws_url(base_url: &str, board_id: Uuid) -> Result<String, NetError> {
    let base = base_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("http://") {
        return Ok(format!("ws://{rest}/ws?boardId={board_id}"));
    }
    if let Some(rest) = base.strip_prefix("https://") {
        return Ok(format!("wss://{rest}/ws?boardId={board_id}"));
    }

    Err(NetError::InvalidBaseUrl(base_url.to_owned()))
}

pub struct RealtimeSession {
    stream: WsStream,
    board_id: Uuid,
    client_id: Uuid,
}

impl RealtimeSession {
    /// Open the board's channel and wait for `session:joined`.
    ///
    /// # Errors
    ///
    /// `Api` with status 400/404 when the server refuses the upgrade,
    /// `WsConnect`/`WsClosed`/`Timeout` for transport failures.
    pub async fn connect(base_url: &str, board_id: Uuid) -> Result<Self, NetError> {
        let url = ws_url(base_url, board_id)?;
        let (mut stream, _) = connect_async(url).await.map_err(NetError::from_ws)?;

        let client_id = loop {
            let frame = recv_next(&mut stream, JOIN_TIMEOUT).await?;
            if frame.event != SESSION_JOINED {
                continue;
            }
            break frame
                .data
                .get("clientId")
                .and_then(Value::as_str)
                .and_then(|raw| Uuid::parse_str(raw).ok())
                .ok_or(NetError::MissingField("clientId"))?;
        };
        debug!("board {board_id}: joined as {client_id}");
        Ok(Self { stream, board_id, client_id })
    }

    #[must_use]
    pub fn board_id(&self) -> Uuid {
        self.board_id
    }

    #[must_use]
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    /// # Errors
    ///
    /// Transport failures.
    pub async fn send(&mut self, outbound: &Outbound) -> Result<(), NetError> {
        self.send_frame(&outbound.to_frame(self.board_id)).await
    }

    /// # Errors
    ///
    /// Transport failures.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), NetError> {
        let text = serde_json::to_string(frame)?;
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|error| NetError::WsConnect(Box::new(error)))
    }

    /// Next frame from the server. Error replies are logged and returned
    /// like any other frame; the mirror decides what they mean.
    ///
    /// # Errors
    ///
    /// `WsClosed` when the server closes the channel (for instance because
    /// the board was deleted), `Timeout` when nothing arrives in time.
    pub async fn next_frame(&mut self, timeout: Duration) -> Result<Frame, NetError> {
        let frame = recv_next(&mut self.stream, timeout).await?;
        if frame.status == Status::Error {
            warn!(
                "board {}: {} failed: {}",
                self.board_id,
                frame.event,
                frame.message().unwrap_or("unknown websocket error")
            );
        }
        Ok(frame)
    }

    /// # Errors
    ///
    /// Transport failures while sending the close frame.
    pub async fn close(mut self) -> Result<(), NetError> {
        self.stream
            .close(None)
            .await
            .map_err(|error| NetError::WsConnect(Box::new(error)))
    }
}

async fn recv_next(stream: &mut WsStream, timeout: Duration) -> Result<Frame, NetError> {
    let fut = async {
        loop {
            let Some(message) = stream.next().await else {
                return Err(NetError::WsClosed);
            };
            match message.map_err(|error| NetError::WsConnect(Box::new(error)))? {
                Message::Text(text) => {
                    return serde_json::from_str::<Frame>(text.as_str()).map_err(NetError::from);
                }
                Message::Close(_) => return Err(NetError::WsClosed),
                _ => {}
            }
        }
    };

    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| NetError::Timeout)?
}

#[cfg(test)]
#[path = "net_test.rs"]
mod tests;
