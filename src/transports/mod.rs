//! Transport implementations.
//!
//! Enable the corresponding Cargo feature to pull in a transport:
//!
//! | Feature                | Transport / Connector                            |
//! |------------------------|--------------------------------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] / [`WebSocketConnector`]  |

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
