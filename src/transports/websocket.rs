//! WebSocket transport over `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] is what [`CollabClient::websocket`](crate::CollabClient::websocket)
//! dials with: one fresh [`WebSocketTransport`] per connect or reconnect.
//! Requires the `transport-websocket` feature (on by default).
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), collab_client::CollabError> {
//! use std::time::Duration;
//! use collab_client::{CollabClient, CollabConfig, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new().with_timeout(Duration::from_secs(5));
//! let client = CollabClient::new(CollabConfig::new("wss://collab.example.com/ws"), connector);
//! client.connect(Some("token")).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::error::CollabError;
use crate::transport::{Connector, Transport};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// One WebSocket connection. Binary frames are accepted when they hold UTF-8
/// text and skipped otherwise.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Dial `url` (`ws://` or `wss://`).
    ///
    /// # Errors
    ///
    /// [`CollabError::Io`] if the URL is invalid or the dial fails.
    pub async fn connect(url: &str) -> Result<Self, CollabError> {
        tracing::debug!(url = %url, "connecting to WebSocket server");

        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(dial_error)?;

        tracing::info!(url = %url, "WebSocket connection established");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established WebSocket stream (custom TLS, headers, proxies).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// [`connect`](Self::connect), failing with [`CollabError::Timeout`] after `timeout`.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, CollabError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| CollabError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), CollabError> {
        if self.closed {
            return Err(CollabError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| CollabError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, CollabError>> {
        if self.closed {
            return None;
        }
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    // The stream is unusable after an error; report it once, then end.
                    self.closed = true;
                    return Some(Err(CollabError::TransportReceive(e.to_string())));
                }
                None => {
                    self.closed = true;
                    return None;
                }
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => tracing::warn!("received non-UTF-8 binary WebSocket frame, skipping"),
                },
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    self.closed = true;
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // tungstenite answers pings itself.
                }
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), CollabError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| CollabError::TransportSend(e.to_string()))
    }
}

/// Dial failures surface as I/O errors, keeping the socket's error kind.
fn dial_error(e: WsError) -> CollabError {
    let kind = match &e {
        WsError::Io(io) => io.kind(),
        _ => std::io::ErrorKind::Other,
    };
    CollabError::Io(std::io::Error::new(kind, e))
}

/// Dials a new [`WebSocketTransport`] for every connection attempt.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    timeout: Option<Duration>,
}

impl WebSocketConnector {
    /// A connector without a dial timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort each dial after `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, CollabError> {
        let transport = match self.timeout {
            Some(timeout) => WebSocketTransport::connect_with_timeout(endpoint, timeout).await?,
            None => WebSocketTransport::connect(endpoint).await?,
        };
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, CollabError::Io(_)));
    }

    #[tokio::test]
    async fn connector_reports_unreachable_host() {
        let result = WebSocketConnector::new().connect("ws://127.0.0.1:1").await;
        assert!(matches!(result, Err(CollabError::Io(_))));
    }

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the address to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn recv_receives_text_messages() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"type":"a"}"#.into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"b"}"#.into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), r#"{"type":"a"}"#);
        assert_eq!(transport.recv().await.unwrap().unwrap(), r#"{"type":"b"}"#);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_accepts_utf8_binary_and_skips_garbage() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Binary(br#"{"type":"bin"}"#.to_vec().into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), r#"{"type":"bin"}"#);
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, CollabError::TransportClosed));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn connector_send_round_trip() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let connector = WebSocketConnector::new().with_timeout(Duration::from_secs(5));
        let mut transport = connector.connect(&url).await.unwrap();
        transport.send("echo".to_string()).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "echo");
    }
}
