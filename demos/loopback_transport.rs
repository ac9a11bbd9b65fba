//! # Loopback Transport Example
//!
//! Shows how to implement [`Transport`] and [`Connector`] with in-process
//! channels, then plays the server side by hand. Useful for:
//!
//! - **Testing**: exercise your application logic without a real server
//! - **Custom backends**: adapt any I/O layer (TCP, QUIC, WebRTC data channels)
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_transport
//! ```

use std::sync::Mutex;

use async_trait::async_trait;
use collab_client::event;
use collab_client::{CollabClient, CollabConfig, CollabError, Connector, Transport};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-based transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of the loopback.
pub struct LoopbackTransport {
    /// Frames the client sends (the server reads the other end).
    tx: mpsc::UnboundedSender<String>,
    /// Frames the server sends.
    rx: mpsc::UnboundedReceiver<String>,
}

/// Server half of the loopback.
pub struct LoopbackServer {
    pub rx: mpsc::UnboundedReceiver<String>,
    pub tx: mpsc::UnboundedSender<String>,
}

fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        },
        LoopbackServer {
            rx: server_rx,
            tx: server_tx,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), CollabError> {
        self.tx
            .send(message)
            .map_err(|e| CollabError::TransportSend(e.to_string()))
    }

    /// Cancel-safe because `UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, CollabError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), CollabError> {
        self.rx.close();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A connector that hands out the prepared transport once
// ─────────────────────────────────────────────────────────────────────

struct OneShotConnector(Mutex<Option<LoopbackTransport>>);

#[async_trait]
impl Connector for OneShotConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, CollabError> {
        tracing::info!("Connector asked for {endpoint}");
        let transport = self
            .0
            .lock()
            .map_err(|_| CollabError::TransportClosed)?
            .take()
            .ok_or(CollabError::TransportClosed)?;
        Ok(Box::new(transport))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Wire the client to the fake server
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (transport, mut server) = loopback_pair();
    let connector = OneShotConnector(Mutex::new(Some(transport)));
    let client = CollabClient::new(
        CollabConfig::new("loopback://demo").with_auto_reconnect(false),
        connector,
    );

    client.on(event::USER_PRESENCE, |ev| {
        tracing::info!("Presence: {:?}", ev.presence());
    });

    // The handshake is queued before the client connects; it is read as soon
    // as the transport opens.
    server.tx.send(
        serde_json::json!({
            "type": "connection_established",
            "clientId": "demo-1",
            "user": {"id": 1, "username": "demo"},
        })
        .to_string(),
    )?;
    let me = client.connect(Some("demo-token")).await?;
    tracing::info!("Connected as {}", me.client_id);

    // ── Request/response: answer the join by hand ───────────────────
    let (joined, ()) = tokio::join!(client.join_room("sandbox"), async {
        if let Some(request) = server.rx.recv().await {
            tracing::info!("Server received: {request}");
        }
        let reply = serde_json::json!({"type": "room_joined", "roomId": "sandbox"});
        let _ = server.tx.send(reply.to_string());
    });
    tracing::info!("Joined {}", joined?.room_id);

    // ── Server push: a presence notice ──────────────────────────────
    server.tx.send(
        serde_json::json!({"type": "user_joined", "userId": 2, "user": {"username": "guest"}})
            .to_string(),
    )?;
    tokio::task::yield_now().await;

    client.disconnect().await;
    tracing::info!("Done. Loopback transport works!");
    Ok(())
}
