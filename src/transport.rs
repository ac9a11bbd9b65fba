//! Transport abstraction for the collaboration protocol.
//!
//! A [`Transport`] is one open, bidirectional text-frame channel to the
//! server. A [`Connector`] opens transports; the connection manager asks it
//! for a fresh one on the first connect and on every reconnect attempt, so a
//! transport is never reused after it closes.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use collab_client::error::CollabError;
//! use collab_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), CollabError> {
//!         // Send one JSON text frame
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, CollabError>> {
//!         // Receive the next JSON text frame; `None` once closed
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), CollabError> {
//!         unimplemented!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, CollabError> {
//!         Ok(Box::new(MyTransport { /* dial `endpoint` */ }))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::CollabError;

/// A bidirectional text message transport.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON message.
/// Each call to [`recv`](Transport::recv) returns one complete JSON message.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is used
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling it
/// again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError::TransportSend`] or [`CollabError::TransportClosed`]
    /// if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), CollabError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred; the connection manager
    ///   reports it and keeps reading, so the transport should yield `None`
    ///   afterwards if it can no longer be used
    /// - `None`: the connection is closed
    async fn recv(&mut self) -> Option<Result<String, CollabError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), CollabError>;
}

/// Opens a new [`Transport`] to an endpoint.
///
/// `endpoint` is the configured URL with the authentication token query
/// parameter already applied.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, CollabError>;
}
