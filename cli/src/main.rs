use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use client::net::NetError;
use client::{ApiClient, RealtimeSession};
use model::event::ChangeElementLayer;
use model::{ClientEvent, Direction, Frame, LayerChange, Position, Status};
use reqwest::Method;
use serde_json::{Value, json};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Net(#[from] NetError),
    #[error("server returned error for {event}: {message}")]
    ServerError { event: String, message: String },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "layerboard-cli", about = "Layerboard HTTP API and realtime channel CLI")]
struct Cli {
    #[arg(long, env = "LAYERBOARD_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Ping,
    Board(BoardCommand),
    Element(ElementCommand),
    /// Print every frame of a board's realtime channel as one JSON line.
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
struct BoardCommand {
    #[command(subcommand)]
    command: BoardSubcommand,
}

#[derive(Subcommand, Debug)]
enum BoardSubcommand {
    Create {
        #[arg(long)]
        project_id: Uuid,
        #[arg(long)]
        section_id: Uuid,
        #[arg(long, default_value = "Untitled Board")]
        name: String,
        #[arg(long = "type")]
        board_type: Option<String>,
    },
    Get {
        board_id: Uuid,
    },
    Rename {
        board_id: Uuid,
        #[arg(long)]
        name: String,
    },
    Delete {
        board_id: Uuid,
        /// Leave the section's reference to the board in place.
        #[arg(long, default_value_t = false)]
        keep_section: bool,
    },
}

#[derive(Args, Debug)]
struct ElementCommand {
    #[command(subcommand)]
    command: ElementSubcommand,
}

#[derive(Subcommand, Debug)]
enum ElementSubcommand {
    Add {
        board_id: Uuid,
        #[arg(long, help = "Element JSON, including `type` and `id`")]
        data: String,
        #[arg(long)]
        layer: Option<usize>,
    },
    Update {
        board_id: Uuid,
        element_id: String,
        #[arg(long, help = "Partial attribute JSON object")]
        data: String,
    },
    Remove {
        board_id: Uuid,
        element_id: String,
    },
    Move {
        board_id: Uuid,
        element_id: String,
        #[arg(long)]
        direction: Direction,
    },
    MoveToLayer {
        board_id: Uuid,
        element_id: String,
        #[arg(long)]
        direction: Direction,
    },
    /// Relocate over the realtime channel, e.g. `--from 0:3 --to 2:0`.
    ChangeLayer {
        board_id: Uuid,
        element_id: String,
        #[arg(long, value_parser = parse_position)]
        from: Position,
        #[arg(long, value_parser = parse_position)]
        to: Position,
    },
}

#[derive(Args, Debug)]
struct WatchArgs {
    board_id: Uuid,

    #[arg(long, help = "Stop after this many frames")]
    max_frames: Option<usize>,

    #[arg(long, default_value_t = 3600)]
    idle_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let api = ApiClient::new(&cli.base_url)?;

    match cli.command {
        Command::Ping => run_ping(&api).await,
        Command::Board(board) => run_board(&api, board).await,
        Command::Element(element) => run_element(&api, &cli.base_url, element).await,
        Command::Watch(args) => run_watch(&cli.base_url, args).await,
    }
}

async fn run_ping(api: &ApiClient) -> Result<(), CliError> {
    api.health().await?;
    println!("ok");
    Ok(())
}

async fn run_board(api: &ApiClient, board: BoardCommand) -> Result<(), CliError> {
    let json = match board.command {
        BoardSubcommand::Create { project_id, section_id, name, board_type } => {
            let mut body = json!({ "projectId": project_id, "sectionId": section_id, "name": name });
            if let Some(board_type) = board_type {
                body["type"] = Value::String(board_type);
            }
            api_request(api, Method::POST, &["boards"], &[], Some(&body)).await?
        }
        BoardSubcommand::Get { board_id } => {
            api_request(api, Method::GET, &["boards", &board_id.to_string()], &[], None).await?
        }
        BoardSubcommand::Rename { board_id, name } => {
            let body = json!({ "name": name });
            api_request(api, Method::PUT, &["boards", &board_id.to_string(), "title"], &[], Some(&body)).await?
        }
        BoardSubcommand::Delete { board_id, keep_section } => {
            let query = [("detachSection", (!keep_section).to_string())];
            api_request(api, Method::DELETE, &["boards", &board_id.to_string()], &query, None).await?
        }
    };
    print_json(&json)
}

async fn run_element(api: &ApiClient, base_url: &str, element: ElementCommand) -> Result<(), CliError> {
    let json = match element.command {
        ElementSubcommand::Add { board_id, data, layer } => {
            let body = serde_json::from_str::<Value>(&data)?;
            let query: Vec<(&str, String)> = layer.map(|l| ("layerNumber", l.to_string())).into_iter().collect();
            api_request(api, Method::POST, &["boards", &board_id.to_string(), "elements"], &query, Some(&body))
                .await?
        }
        ElementSubcommand::Update { board_id, element_id, data } => {
            let body = serde_json::from_str::<Value>(&data)?;
            let segments = ["boards", &board_id.to_string(), "elements", &element_id];
            api_request(api, Method::PUT, &segments, &[], Some(&body)).await?
        }
        ElementSubcommand::Remove { board_id, element_id } => {
            let segments = ["boards", &board_id.to_string(), "elements", &element_id];
            api_request(api, Method::DELETE, &segments, &[], None).await?
        }
        ElementSubcommand::Move { board_id, element_id, direction } => {
            let segments = ["boards", &board_id.to_string(), "elements", &element_id, "move"];
            api_request(api, Method::PUT, &segments, &[("direction", direction.as_str().to_owned())], None).await?
        }
        ElementSubcommand::MoveToLayer { board_id, element_id, direction } => {
            let segments = ["boards", &board_id.to_string(), "elements", &element_id, "move-to-layer"];
            api_request(api, Method::PUT, &segments, &[("direction", direction.as_str().to_owned())], None).await?
        }
        ElementSubcommand::ChangeLayer { board_id, element_id, from, to } => {
            let event = ClientEvent::ChangeElementLayer(ChangeElementLayer {
                id: element_id,
                action: LayerChange { prev_position: from, new_position: to },
            });
            ws_request(base_url, board_id, &event).await?.data
        }
    };
    print_json(&json)
}

async fn run_watch(base_url: &str, args: WatchArgs) -> Result<(), CliError> {
    let mut session = RealtimeSession::connect(base_url, args.board_id).await?;
    eprintln!("watching board {} as client {}", args.board_id, session.client_id());

    let idle = Duration::from_secs(args.idle_timeout_secs);
    let mut seen = 0_usize;
    loop {
        let frame = match session.next_frame(idle).await {
            Ok(frame) => frame,
            Err(NetError::WsClosed) => {
                eprintln!("channel closed after {seen} frames");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        println!("{}", serde_json::to_string(&frame)?);

        seen = seen.saturating_add(1);
        if args.max_frames.is_some_and(|limit| seen >= limit) {
            break;
        }
    }
    session.close().await?;
    Ok(())
}

/// Send one event over a fresh realtime session and wait for its reply.
async fn ws_request(base_url: &str, board_id: Uuid, event: &ClientEvent) -> Result<Frame, CliError> {
    let mut session = RealtimeSession::connect(base_url, board_id).await?;
    let request = event.to_frame(board_id);
    session.send_frame(&request).await?;

    let reply = wait_for_terminal_response(&mut session, request.id).await;
    session.close().await?;
    reply
}

async fn wait_for_terminal_response(session: &mut RealtimeSession, request_id: Uuid) -> Result<Frame, CliError> {
    loop {
        let frame = session.next_frame(Duration::from_secs(15)).await?;
        if frame.parent_id != Some(request_id) {
            continue;
        }
        if frame.status == Status::Error {
            return Err(CliError::ServerError {
                message: frame.message().unwrap_or("unknown websocket error").to_owned(),
                event: frame.event,
            });
        }
        if frame.status == Status::Done {
            return Ok(frame);
        }
    }
}

async fn api_request(
    api: &ApiClient,
    method: Method,
    segments: &[&str],
    query: &[(&str, String)],
    body: Option<&Value>,
) -> Result<Value, CliError> {
    Ok(api.request::<Value>(method, segments, query, body).await?)
}

fn parse_position(raw: &str) -> Result<Position, String> {
    let (layer, index) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected LAYER:INDEX, got {raw}"))?;
    let layer = layer.trim().parse().map_err(|_| format!("invalid layer in {raw}"))?;
    let index = index.trim().parse().map_err(|_| format!("invalid index in {raw}"))?;
    Ok(Position::new(layer, index))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
