//! Room chat client: terminal entry point.
//!
//! Joins (or creates) one chat room and runs an interactive line-oriented
//! session: anything typed is sent to the room, incoming messages are printed
//! as they arrive, and a handful of `/commands` control the session.
//!
//! # Usage
//!
//! ```text
//! chat-client --room <ROOM> --user <NAME> [OPTIONS]
//!
//! Options:
//!   --config <PATH>              Config file [default: platform config dir]
//!   --server <URL>               Chat server base URL (overrides the file)
//!   --create                     Create the room instead of joining it
//!   --handshake-timeout-ms <MS>  Broker handshake deadline
//!   --save-config                Write the effective config back to disk
//! ```
//!
//! | Variable      | Description                  |
//! |---------------|------------------------------|
//! | `CHAT_CONFIG` | Config file path             |
//! | `CHAT_SERVER` | Chat server base URL         |
//! | `CHAT_USER`   | User name                    |
//! | `RUST_LOG`    | Log filter (logs go to stderr) |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chat_client::application::collaborators::{RoomAdmin, RoomServiceError};
use chat_client::application::room_session::RoomSession;
use chat_client::infrastructure::console::commands::{parse_input, Input, HELP};
use chat_client::infrastructure::console::{ChannelListener, ConsoleView};
use chat_client::infrastructure::http::HttpRoomService;
use chat_client::infrastructure::network::NetworkTransportFactory;
use chat_client::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, ClientConfig,
};
use chat_core::{validate_identity, RoomDescriptor};
use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Terminal client for room-based chat.
#[derive(Debug, Parser)]
#[command(name = "chat-client", about = "Join a chat room from the terminal", version)]
struct Cli {
    /// Path of the TOML config file.
    #[arg(long, env = "CHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Chat server base URL, e.g. `http://localhost:8080`.
    #[arg(long, env = "CHAT_SERVER")]
    server: Option<String>,

    /// Room to join.
    #[arg(long)]
    room: String,

    /// Name shown to other participants.
    #[arg(long, env = "CHAT_USER")]
    user: String,

    /// Create the room first.  Fails if it already exists.
    #[arg(long)]
    create: bool,

    /// How long to wait for the broker to acknowledge the session.
    #[arg(long)]
    handshake_timeout_ms: Option<u64>,

    /// Write the effective configuration (file plus overrides) back to the
    /// config file before connecting.
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("no --config given and no platform config dir"),
        }
    }

    /// Command-line values win over the file.
    fn apply_overrides(&self, config: &mut ClientConfig) {
        if let Some(server) = &self.server {
            config.server.base_url = server.clone();
        }
        if let Some(ms) = self.handshake_timeout_ms {
            config.session.handshake_timeout_ms = ms;
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config_path()?;
    let mut config = load_config_from(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    cli.apply_overrides(&mut config);

    // Logs go to stderr so they never interleave with the chat on stdout.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    if cli.save_config {
        save_config_to(&config, &config_path)
            .with_context(|| format!("failed to save config to {}", config_path.display()))?;
        info!(path = %config_path.display(), "config saved");
    }

    let http = reqwest::Client::new();
    let rooms = Arc::new(
        HttpRoomService::new(
            http.clone(),
            &config.api_url(),
            config.server.history_page_size,
        )
        .context("invalid server URL")?,
    );

    validate_identity(&cli.room, &cli.user)?;
    let room = resolve_room(rooms.as_ref(), &cli.room, cli.create).await?;
    info!(room = %room.room_id, user = %cli.user, server = %config.server.base_url, "joining");

    let transports = Arc::new(NetworkTransportFactory::new(config.network_config(), http));
    let (listener, mut notifications) = ChannelListener::new();
    let mut session = RoomSession::new(
        config.session_config(),
        transports,
        rooms,
        Box::new(listener),
    );
    let mut view = ConsoleView::new(cli.user.clone());

    session
        .join(&room, &cli.user)
        .context("could not start the session")?;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // ── Main loop ─────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("failed to listen for Ctrl+C: {e}");
                }
                break;
            }
            Some(notification) = notifications.recv() => {
                for line in view.apply(notification, Utc::now()) {
                    println!("{line}");
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                let input = parse_input(&line);
                if let Flow::Quit = handle_input(input, &mut session, &mut view, &room, &cli.user) {
                    break;
                }
            }
            () = session.pump() => {}
        }
    }

    session.leave();
    info!("chat client stopped");
    Ok(())
}

/// Looks the room up, or creates it, and turns service errors into
/// something a user can act on.
async fn resolve_room(
    rooms: &dyn RoomAdmin,
    room_id: &str,
    create: bool,
) -> anyhow::Result<RoomDescriptor> {
    let result = if create {
        rooms.create_room(room_id).await
    } else {
        rooms.join_room(room_id).await
    };
    match result {
        Ok(room) => Ok(room),
        Err(RoomServiceError::RoomNotFound(id)) => {
            anyhow::bail!("room '{id}' does not exist; pass --create to make it")
        }
        Err(RoomServiceError::RoomAlreadyExists(id)) => {
            anyhow::bail!("room '{id}' already exists; drop --create to join it")
        }
        Err(e) => Err(e).context("room service request failed"),
    }
}

fn handle_input(
    input: Input,
    session: &mut RoomSession,
    view: &mut ConsoleView,
    room: &RoomDescriptor,
    user: &str,
) -> Flow {
    match input {
        Input::Say(text) => {
            if let Err(e) = session.send(&text) {
                println!("! {e}");
            }
        }
        Input::Pin(index) => println!("{}", view.pin(index)),
        Input::Unpin => println!("{}", view.unpin()),
        Input::Leave => session.leave(),
        Input::Rejoin => {
            if let Err(e) = session.join(room, user) {
                println!("! {e}");
            }
        }
        Input::Help => println!("{HELP}"),
        Input::Invalid(message) => println!("! {message}"),
        Input::Empty => {}
        Input::Quit => return Flow::Quit,
    }
    Flow::Continue
}

// ── Tests ─────────────────────────────────────────────────────────────────────
