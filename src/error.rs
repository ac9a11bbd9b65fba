//! Error types for the collaboration client.

use thiserror::Error;

/// Errors that can occur when using the collaboration client.
#[derive(Debug, Error)]
pub enum CollabError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An inbound payload was not a valid message envelope.
    #[error("malformed message: {0}")]
    Decode(String),

    /// Attempted an operation that requires an open connection.
    #[error("not connected to server")]
    NotConnected,

    /// The connection closed while a correlated request was pending.
    #[error("disconnected before a response arrived")]
    Disconnected,

    /// A correlated request did not receive its response in time.
    #[error("operation timed out")]
    Timeout,

    /// The response event carried a payload of an unexpected shape.
    #[error("unexpected response on `{event}`")]
    UnexpectedResponse {
        /// Name of the event that resolved the request.
        event: &'static str,
    },

    /// An I/O error occurred while establishing a connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for collaboration client operations.
pub type Result<T> = std::result::Result<T, CollabError>;
