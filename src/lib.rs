//! # Collab Client
//!
//! Async client for a real-time collaboration server: chat rooms, presence,
//! file sharing and application state relay, spoken as JSON text frames over
//! any bidirectional transport.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   `WebSocketTransport` and `WebSocketConnector`
//! - **Event-driven**: subscribe to named events on an [`EventBus`]; every
//!   inbound message is emitted under its own tag, under `message`, and under
//!   a derived event where one applies
//! - **Request/response over events**: [`CollabClient::join_room`],
//!   [`CollabClient::get_messages`] and friends resolve with the matching
//!   response event
//! - **Automatic reconnection** with a fixed delay and at most one pending
//!   attempt
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use collab_client::{event, CollabClient, CollabConfig};
//!
//! let client = CollabClient::websocket(CollabConfig::new("ws://localhost:8080/ws"));
//! client.on(event::USER_PRESENCE, |ev| println!("presence: {ev:?}"));
//!
//! let me = client.connect(Some("token")).await?;
//! client.join_room("lobby").await?;
//! client.send_message("hello").await?;
//! ```

pub mod bus;
pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod event;
mod pending;
pub mod protocol;
pub mod router;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use bus::{EventBus, Subscription, SubscriptionId};
pub use client::{CollabClient, CollabConfig, FileUpload, HistoryQuery, ImageUpload};
pub use connection::{Lifecycle, ReconnectPolicy};
pub use error::CollabError;
pub use event::Event;
pub use protocol::{ClientMessage, InboundMessage, ServerMessage};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
