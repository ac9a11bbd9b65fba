//! Async client for the collaboration server.
//!
//! [`CollabClient`] is a handle to one logical connection. Its connection loop
//! runs as a background task that owns the transport; the handle forwards
//! outbound messages to it over an unbounded channel and exposes the event bus
//! that the loop emits on.
//!
//! Operations come in two kinds:
//!
//! - **Correlated** ([`connect`](CollabClient::connect),
//!   [`join_room`](CollabClient::join_room),
//!   [`get_messages`](CollabClient::get_messages),
//!   [`get_files`](CollabClient::get_files)) send a request and resolve with
//!   the next matching response event.
//! - **Fire-and-forget** ([`send_message`](CollabClient::send_message),
//!   [`send_image`](CollabClient::send_image),
//!   [`upload_file`](CollabClient::upload_file),
//!   [`broadcast_state`](CollabClient::broadcast_state)) resolve once the
//!   connection loop has written the message to the transport. The server
//!   sends no acknowledgement for them.
//!
//! Every operation fails fast with [`CollabError::NotConnected`] while no
//! transport is open, including a message accepted just before a close that
//! the loop handles first. Nothing is queued for later delivery.
//!
//! # Example
//!
//! ```rust,ignore
//! let client = CollabClient::websocket(CollabConfig::new("wss://collab.example.com/ws"));
//! client.on(event::CHAT_MESSAGE, |ev| println!("{ev:?}"));
//!
//! let me = client.connect(Some("secret-token")).await?;
//! let room = client.join_room("design-review").await?;
//! client.send_message("hello").await?;
//! client.disconnect().await;
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::bus::{EventBus, Subscription, SubscriptionId};
use crate::connection::{
    endpoint_with_token, ConnectionManager, Lifecycle, Outbound, ReconnectPolicy, SharedState,
};
use crate::error::{CollabError, Result};
use crate::event::{self, DisconnectInfo, Event};
use crate::pending::{Correlator, Delivery, PendingRequest};
use crate::protocol::{
    AppStateBroadcast, ChatMessage, ClientMessage, ConnectionEstablished, Id, RoomJoined,
    ServerMessage, Timestamp, UserProfile,
};
use crate::transport::Connector;

/// Default delay before a reconnect attempt.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`CollabClient`].
///
/// The only required field is the endpoint URL.
///
/// # Example
///
/// ```
/// use collab_client::client::CollabConfig;
/// use std::time::Duration;
///
/// let config = CollabConfig::new("ws://localhost:8080/ws")
///     .with_reconnect_delay(Duration::from_secs(5))
///     .with_request_timeout(Duration::from_secs(10));
/// assert!(config.auto_reconnect);
/// assert_eq!(config.request_timeout, Some(Duration::from_secs(10)));
/// ```
#[derive(Debug, Clone)]
pub struct CollabConfig {
    /// Server endpoint. The authentication token is appended as a `token`
    /// query parameter on every attempt.
    pub url: String,
    /// Reopen the connection after it closes unexpectedly.
    ///
    /// Defaults to **true**. An explicit [`CollabClient::disconnect`] is never
    /// followed by a reconnect.
    pub auto_reconnect: bool,
    /// Fixed delay between a close and the reconnect attempt.
    ///
    /// Defaults to **3 seconds**.
    pub reconnect_delay: Duration,
    /// Upper bound on how long a correlated request waits for its response.
    ///
    /// Defaults to **none**: a request whose response never arrives waits
    /// until the connection drops (see `reject_pending_on_disconnect`).
    pub request_timeout: Option<Duration>,
    /// Fail pending correlated requests with [`CollabError::Disconnected`]
    /// when the connection closes.
    ///
    /// Defaults to **true**. A pending [`CollabClient::connect`] is only
    /// failed when no reconnect will follow.
    pub reject_pending_on_disconnect: bool,
    /// Time the connection loop gets to close the transport on
    /// [`CollabClient::disconnect`] before it is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl CollabConfig {
    /// Create a configuration for `url` with default values.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auto_reconnect: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            request_timeout: None,
            reject_pending_on_disconnect: true,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Enable or disable automatic reconnection.
    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the delay before each reconnect attempt.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Bound how long correlated requests wait for their response.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Choose whether a disconnect fails pending correlated requests.
    #[must_use]
    pub fn with_reject_pending_on_disconnect(mut self, reject: bool) -> Self {
        self.reject_pending_on_disconnect = reject;
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.auto_reconnect,
            delay: self.reconnect_delay,
        }
    }
}

// ── Request parameters ──────────────────────────────────────────────

/// An image to post with [`CollabClient::send_image`].
#[derive(Debug, Clone, Default)]
pub struct ImageUpload {
    pub filename: String,
    /// Encoded image data, typically a `data:` URL.
    pub data: String,
    pub caption: Option<String>,
}

impl ImageUpload {
    pub fn new(filename: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
            caption: None,
        }
    }

    #[must_use]
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

/// A completed file upload to announce with [`CollabClient::upload_file`].
#[derive(Debug, Clone, Default)]
pub struct FileUpload {
    pub filename: String,
    /// Encoded file contents.
    pub data: String,
    /// Target folder in the room's file tree.
    pub path: Option<String>,
    pub description: Option<String>,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Paging for [`CollabClient::get_messages`]. The default asks for the
/// server's default page of the most recent messages.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    /// Only messages older than this.
    pub before: Option<Timestamp>,
}

impl HistoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_before(mut self, before: Timestamp) -> Self {
        self.before = Some(before);
        self
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// The running connection loop of a client.
struct Session {
    cmd_tx: mpsc::UnboundedSender<Outbound>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client handle for one logical connection.
///
/// Instances are fully independent: each owns its event bus, state and
/// connection task. All methods take `&self`, so the handle can be shared
/// behind an [`Arc`].
pub struct CollabClient {
    config: CollabConfig,
    connector: Arc<dyn Connector>,
    bus: EventBus,
    state: Arc<SharedState>,
    correlator: Arc<Correlator>,
    session: Mutex<Option<Session>>,
}

impl CollabClient {
    /// Create an idle client that opens transports through `connector`.
    ///
    /// No connection is made until [`connect`](Self::connect).
    pub fn new(config: CollabConfig, connector: impl Connector) -> Self {
        let bus = EventBus::new();
        let correlator = Correlator::new(config.reject_pending_on_disconnect);
        // Registered first so pending calls resolve before user handlers run.
        correlator.attach(
            &bus,
            &[
                (event::CONNECTION_ESTABLISHED, Delivery::Broadcast),
                (event::ROOM_JOINED, Delivery::Fifo),
                (event::MESSAGE_HISTORY, Delivery::Fifo),
                (event::FILE_LIST, Delivery::Fifo),
            ],
        );

        Self {
            config,
            connector: Arc::new(connector),
            bus,
            state: Arc::new(SharedState::new()),
            correlator,
            session: Mutex::new(None),
        }
    }

    /// Create an idle client that connects over WebSocket.
    #[cfg(feature = "transport-websocket")]
    pub fn websocket(config: CollabConfig) -> Self {
        Self::new(config, crate::transports::WebSocketConnector::new())
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Open the connection and wait for the server handshake.
    ///
    /// Resolves with the identity from the first `connection_established`;
    /// transport-open alone is not enough. `token` is sent as the `token`
    /// query parameter on this and every reconnect attempt.
    ///
    /// If a connection loop is already running, no second transport is
    /// opened: the call resolves with the current identity, or waits for the
    /// handshake of the attempt in flight (`token` is then ignored).
    ///
    /// # Errors
    ///
    /// - [`CollabError::Disconnected`] if the connection closes and no
    ///   reconnect will follow (with `reject_pending_on_disconnect`)
    /// - [`CollabError::Timeout`] if `request_timeout` elapses first
    pub async fn connect(&self, token: Option<&str>) -> Result<ConnectionEstablished> {
        let pending = self
            .correlator
            .register(event::CONNECTION_ESTABLISHED, self.config.auto_reconnect);

        let joined_existing = {
            let mut session = lock(&self.session);
            if self.state.is_running() && session.is_some() {
                true
            } else {
                let endpoint = endpoint_with_token(&self.config.url, token);
                debug!(url = %self.config.url, "starting connection loop");
                if let Some(stale) = session.replace(self.spawn_session(endpoint)) {
                    stale.task.abort();
                }
                false
            }
        };

        if joined_existing && self.state.is_established() {
            if let Some(identity) = self.state.identity() {
                return Ok(identity);
            }
        }
        if joined_existing {
            debug!("connect: joining the connection attempt in flight");
        }

        match pending.wait(self.config.request_timeout).await? {
            ServerMessage::ConnectionEstablished(identity) => Ok(identity),
            _ => Err(CollabError::UnexpectedResponse {
                event: event::CONNECTION_ESTABLISHED,
            }),
        }
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Cancels any pending reconnect and closes the transport. A final
    /// `disconnected` (with `by_caller` set) is emitted if a transport was
    /// open or a dial was in flight, so a pending [`connect`](Self::connect)
    /// fails with [`CollabError::Disconnected`]. Does nothing if the client
    /// was never connected.
    pub async fn disconnect(&self) {
        let Some(mut session) = lock(&self.session).take() else {
            return;
        };
        debug!("disconnect requested");

        if let Some(tx) = session.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the loop with a timeout; abort it if it does not exit in time.
        match tokio::time::timeout(self.config.shutdown_timeout, &mut session.task).await {
            Ok(Ok(())) => {}
            Ok(Err(join_err)) => {
                warn!("connection loop terminated with join error: {join_err}");
            }
            Err(_) => {
                warn!("connection loop did not exit within timeout; aborting task");
                session.task.abort();
                if self.state.lifecycle() != Lifecycle::Closed {
                    self.state.mark_closed();
                    self.bus.emit(
                        event::DISCONNECTED,
                        &Event::Disconnected(DisconnectInfo {
                            reason: Some("connection loop aborted".into()),
                            by_caller: true,
                            will_reconnect: false,
                        }),
                    );
                }
            }
        }

        self.state.set_running(false);
        self.state.set_lifecycle(Lifecycle::Closed);
    }

    // ── Correlated requests ─────────────────────────────────────────

    /// Join a room and wait for the server to confirm membership.
    ///
    /// # Errors
    ///
    /// [`CollabError::NotConnected`] if no transport is open, plus the
    /// pending-request failures described on [`connect`](Self::connect).
    pub async fn join_room(&self, room_id: impl Into<String>) -> Result<RoomJoined> {
        let reply = self
            .request(
                ClientMessage::JoinRoom {
                    room_id: room_id.into(),
                },
                event::ROOM_JOINED,
            )
            .await?;
        match reply {
            ServerMessage::RoomJoined(payload) => Ok(payload),
            _ => Err(CollabError::UnexpectedResponse {
                event: event::ROOM_JOINED,
            }),
        }
    }

    /// Fetch chat history for the current room.
    ///
    /// # Errors
    ///
    /// Same as [`join_room`](Self::join_room).
    pub async fn get_messages(&self, query: HistoryQuery) -> Result<Vec<ChatMessage>> {
        let reply = self
            .request(
                ClientMessage::GetMessages {
                    limit: query.limit,
                    before: query.before,
                },
                event::MESSAGE_HISTORY,
            )
            .await?;
        match reply {
            ServerMessage::MessageHistory(history) => Ok(history.messages),
            _ => Err(CollabError::UnexpectedResponse {
                event: event::MESSAGE_HISTORY,
            }),
        }
    }

    /// Fetch the room's file listing, optionally below `path`.
    ///
    /// # Errors
    ///
    /// Same as [`join_room`](Self::join_room).
    pub async fn get_files(&self, path: Option<&str>) -> Result<Vec<Value>> {
        let reply = self
            .request(
                ClientMessage::GetFiles {
                    path: path.map(str::to_owned),
                },
                event::FILE_LIST,
            )
            .await?;
        match reply {
            ServerMessage::FileList(list) => Ok(list.files),
            _ => Err(CollabError::UnexpectedResponse {
                event: event::FILE_LIST,
            }),
        }
    }

    // ── Fire-and-forget ─────────────────────────────────────────────

    /// Post a text message to the current room.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError::NotConnected`] if no transport is open, or the
    /// transport error if the write fails.
    pub async fn send_message(&self, content: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::TextMessage {
            content: content.into(),
        })
        .await
    }

    /// Post an image to the current room.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError::NotConnected`] if no transport is open.
    pub async fn send_image(&self, image: ImageUpload) -> Result<()> {
        self.send(ClientMessage::ImageMessage {
            filename: image.filename,
            data: image.data,
            caption: image.caption,
        })
        .await
    }

    /// Announce a completed file upload to the current room.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError::NotConnected`] if no transport is open.
    pub async fn upload_file(&self, file: FileUpload) -> Result<()> {
        self.send(ClientMessage::FileUploadComplete {
            filename: file.filename,
            data: file.data,
            path: file.path,
            description: file.description,
        })
        .await
    }

    /// Relay an application state blob to every room member, stamped with
    /// the current time.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError::NotConnected`] if no transport is open.
    pub async fn broadcast_state(&self, app_name: impl Into<String>, state: Value) -> Result<()> {
        self.send(ClientMessage::AppStateBroadcast(AppStateBroadcast {
            app_name: app_name.into(),
            state,
            timestamp: Timestamp::now(),
            user_id: None,
            extra: serde_json::Map::new(),
        }))
        .await
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Register a handler for every emission of `event`.
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.bus.subscribe(event, handler)
    }

    /// Register a handler for the next emission of `event` only.
    pub fn once<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.bus.subscribe_once(event, handler)
    }

    /// Remove a handler. Unknown events and ids are ignored.
    pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(event, id)
    }

    /// The client's event bus.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lifecycle()
    }

    /// Returns `true` while a transport is open.
    pub fn is_connected(&self) -> bool {
        self.state.lifecycle() == Lifecycle::Open
    }

    /// Client id from the latest handshake.
    pub fn client_id(&self) -> Option<Id> {
        self.state.client_id()
    }

    /// User profile from the latest handshake.
    pub fn user(&self) -> Option<UserProfile> {
        self.state.user()
    }

    /// The room confirmed by the latest `room_joined`.
    pub fn current_room_id(&self) -> Option<String> {
        self.state.room_id()
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn spawn_session(&self, endpoint: String) -> Session {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Outbound>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        self.state.set_running(true);
        self.state.set_lifecycle(Lifecycle::Connecting);

        let manager = ConnectionManager::new(
            Arc::clone(&self.connector),
            endpoint,
            self.config.reconnect_policy(),
            self.bus.clone(),
            Arc::clone(&self.state),
        );
        let task = tokio::spawn(manager.run(cmd_rx, shutdown_rx));

        Session {
            cmd_tx,
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }

    /// Register the waiter, then send; the waiter is withdrawn if sending fails.
    async fn request(&self, msg: ClientMessage, response: &'static str) -> Result<ServerMessage> {
        let pending: PendingRequest = self.correlator.register(response, false);
        self.send(msg).await?;
        pending.wait(self.config.request_timeout).await
    }

    /// Hand a message to the connection loop and wait until it is written.
    async fn send(&self, msg: ClientMessage) -> Result<()> {
        if self.state.lifecycle() != Lifecycle::Open {
            return Err(CollabError::NotConnected);
        }
        let cmd_tx = match lock(&self.session).as_ref() {
            Some(session) => session.cmd_tx.clone(),
            None => return Err(CollabError::NotConnected),
        };
        let (outbound, ack) = Outbound::new(msg);
        cmd_tx
            .send(outbound)
            .map_err(|_| CollabError::NotConnected)?;
        // The loop drops the ack only when it exits without handling the message.
        ack.await.unwrap_or(Err(CollabError::NotConnected))
    }
}

impl std::fmt::Debug for CollabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollabClient")
            .field("url", &self.config.url)
            .field("lifecycle", &self.lifecycle())
            .field("client_id", &self.client_id())
            .field("room_id", &self.current_room_id())
            .finish()
    }
}

impl Drop for CollabClient {
    fn drop(&mut self) {
        // No executor context here for a graceful close; abort the loop.
        if let Some(session) = lock(&self.session).take() {
            session.task.abort();
        }
    }
}
