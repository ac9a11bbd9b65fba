//! # Chat Session Example
//!
//! Demonstrates a complete collab client session over WebSocket:
//!
//! 1. Connect with an authentication token and wait for the handshake
//! 2. Join a room
//! 3. Load recent history and the room's files
//! 4. Print chat and presence events as they arrive
//! 5. Disconnect on Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # Start a collaboration server on localhost:8080, then:
//! cargo run --example chat_session
//!
//! # Override the defaults:
//! COLLAB_URL=ws://my-server:8080/ws COLLAB_TOKEN=abc COLLAB_ROOM=design \
//!     cargo run --example chat_session
//! ```

use collab_client::event::{self, Event};
use collab_client::protocol::ServerMessage;
use collab_client::{CollabClient, CollabConfig, HistoryQuery};

/// Default server URL when `COLLAB_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8080/ws";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=collab_client=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("COLLAB_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let token = std::env::var("COLLAB_TOKEN").ok();
    let room = std::env::var("COLLAB_ROOM").unwrap_or_else(|_| "lobby".to_string());

    let config = CollabConfig::new(&url).with_request_timeout(std::time::Duration::from_secs(10));
    let client = CollabClient::websocket(config);

    // ── Handlers ────────────────────────────────────────────────────
    client.on(event::CHAT_MESSAGE, |ev| {
        if let Some(
            ServerMessage::TextMessage(msg)
            | ServerMessage::ImageMessage(msg)
            | ServerMessage::FileShared(msg),
        ) = ev.server_message()
        {
            tracing::info!("[{}] {}", msg.username, msg.content);
        }
    });
    client.on(event::USER_PRESENCE, |ev| {
        if let Some(p) = ev.presence() {
            tracing::info!("user {} {:?}", p.user_id, p.change);
        }
    });
    client.on(event::DISCONNECTED, |ev| {
        if let Event::Disconnected(info) = ev {
            tracing::warn!(
                "disconnected ({}), reconnecting: {}",
                info.reason.as_deref().unwrap_or("unknown"),
                info.will_reconnect
            );
        }
    });
    client.on(event::ERROR, |ev| {
        if let Event::Error(err) = ev {
            tracing::error!("{:?}: {}", err.kind, err.message);
        }
    });

    // ── Session ─────────────────────────────────────────────────────
    tracing::info!("Connecting to {url}");
    let me = client.connect(token.as_deref()).await?;
    tracing::info!("Connected as client {}", me.client_id);

    let joined = client.join_room(room.as_str()).await?;
    tracing::info!(
        "Joined room {} with {} user(s)",
        joined.room_id,
        joined.current_users.len()
    );

    let history = client.get_messages(HistoryQuery::new().with_limit(20)).await?;
    for msg in &history {
        tracing::info!("(history) [{}] {}", msg.username, msg.content);
    }
    let files = client.get_files(None).await?;
    tracing::info!("{} file(s) in the room", files.len());

    client.send_message("hello from the Rust client").await?;

    // ── Wait for Ctrl+C ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received, disconnecting");
    client.disconnect().await;
    Ok(())
}
