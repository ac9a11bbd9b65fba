//! Connection lifecycle: connect, receive, close, reconnect.
//!
//! `ConnectionManager` runs as one background task per client. It owns the
//! only transport handle and the only reconnect timer, and it is the only
//! place that emits lifecycle events, so every transport callback, timer
//! firing and event emission happens one at a time, in arrival order.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──open──▶ Open ──close/error──▶ Closed
//!                        ▲                                       │
//!                        └──────── reconnect timer fires ────────┘
//! ```
//!
//! A transport error is reported as an [`ERROR`](event::ERROR) event and does
//! not change state; the close that follows drives the transition to
//! `Closed`. An explicit disconnect cancels any pending reconnect and is never
//! followed by one.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::bus::EventBus;
use crate::codec;
use crate::error::CollabError;
use crate::event::{self, DisconnectInfo, ErrorEvent, ErrorKind, Event};
use crate::protocol::{ClientMessage, ConnectionEstablished, Id, UserProfile};
use crate::router;
use crate::transport::{Connector, Transport};

// ── Lifecycle ───────────────────────────────────────────────────────

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    /// No connection has been attempted yet.
    Idle = 0,
    /// A transport is being opened.
    Connecting = 1,
    /// The transport is open. The handshake may still be outstanding.
    Open = 2,
    /// The transport closed, failed to open, or was closed by the caller.
    Closed = 3,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Closed,
            _ => Self::Idle,
        }
    }
}

/// Automatic reconnection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    /// Fixed delay between a close and the next attempt.
    pub delay: Duration,
}

// ── Shared state ────────────────────────────────────────────────────

/// State written by the connection task and read by the client handle and handlers.
pub(crate) struct SharedState {
    lifecycle: AtomicU8,
    /// A connection loop is alive and will (re)open a transport on its own.
    running: AtomicBool,
    /// The handshake arrived on the current transport.
    established: AtomicBool,
    identity: Mutex<Option<ConnectionEstablished>>,
    room_id: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            lifecycle: AtomicU8::new(Lifecycle::Idle as u8),
            running: AtomicBool::new(false),
            established: AtomicBool::new(false),
            identity: Mutex::new(None),
            room_id: Mutex::new(None),
        }
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    pub(crate) fn set_lifecycle(&self, lifecycle: Lifecycle) {
        self.lifecycle.store(lifecycle as u8, Ordering::Release);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    /// Record a fresh handshake. Identity is replaced on every (re)connection.
    pub(crate) fn set_identity(&self, identity: ConnectionEstablished) {
        *lock(&self.identity) = Some(identity);
        self.established.store(true, Ordering::Release);
    }

    pub(crate) fn identity(&self) -> Option<ConnectionEstablished> {
        lock(&self.identity).clone()
    }

    pub(crate) fn client_id(&self) -> Option<Id> {
        lock(&self.identity).as_ref().map(|i| i.client_id.clone())
    }

    pub(crate) fn user(&self) -> Option<UserProfile> {
        lock(&self.identity).as_ref().and_then(|i| i.user.clone())
    }

    pub(crate) fn set_room(&self, room_id: String) {
        *lock(&self.room_id) = Some(room_id);
    }

    pub(crate) fn room_id(&self) -> Option<String> {
        lock(&self.room_id).clone()
    }

    pub(crate) fn mark_closed(&self) {
        self.set_lifecycle(Lifecycle::Closed);
        self.established.store(false, Ordering::Release);
    }
}

// ── Reconnect timer ─────────────────────────────────────────────────

/// The single pending reconnect attempt, if any.
#[derive(Debug, Default)]
pub(crate) struct ReconnectTimer {
    deadline: Option<Instant>,
}

impl ReconnectTimer {
    /// Arm the timer unless it is already pending. Returns `true` if armed.
    pub(crate) fn schedule(&mut self, delay: Duration) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(Instant::now() + delay);
        true
    }

    /// Disarm the timer. Returns `true` if it was pending.
    pub(crate) fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the deadline passes; never resolves while disarmed.
    async fn fired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

// ── Endpoint ────────────────────────────────────────────────────────

/// Append the authentication token as a `token` query parameter.
pub(crate) fn endpoint_with_token(url: &str, token: Option<&str>) -> String {
    match token {
        Some(token) => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{url}{sep}token={}", urlencoding::encode(token))
        }
        None => url.to_owned(),
    }
}

// ── Connection manager ──────────────────────────────────────────────

/// An outbound message and the channel its transmit result is reported on.
pub(crate) struct Outbound {
    pub(crate) message: ClientMessage,
    pub(crate) ack: oneshot::Sender<Result<(), CollabError>>,
}

impl Outbound {
    pub(crate) fn new(
        message: ClientMessage,
    ) -> (Self, oneshot::Receiver<Result<(), CollabError>>) {
        let (ack, rx) = oneshot::channel();
        (Self { message, ack }, rx)
    }
}

enum Step {
    Shutdown,
    Reconnect,
    Command(Option<Outbound>),
    Frame(Option<Result<String, CollabError>>),
}

/// Drives one logical connection for its whole life, across reconnects.
pub(crate) struct ConnectionManager {
    connector: Arc<dyn Connector>,
    endpoint: String,
    policy: ReconnectPolicy,
    transport: Option<Box<dyn Transport>>,
    timer: ReconnectTimer,
    closed_by_caller: bool,
    bus: EventBus,
    state: Arc<SharedState>,
}

impl ConnectionManager {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        endpoint: String,
        policy: ReconnectPolicy,
        bus: EventBus,
        state: Arc<SharedState>,
    ) -> Self {
        Self {
            connector,
            endpoint,
            policy,
            transport: None,
            timer: ReconnectTimer::default(),
            closed_by_caller: false,
            bus,
            state,
        }
    }

    /// Open the first transport, then multiplex commands, inbound frames,
    /// the reconnect timer and the shutdown signal until the connection is
    /// closed for good.
    pub(crate) async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Outbound>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!("connection loop started");
        if self.open(&mut shutdown_rx).await.is_break() {
            return self.exit();
        }

        while self.transport.is_some() || self.timer.is_pending() {
            let step = tokio::select! {
                biased;
                _ = &mut shutdown_rx => Step::Shutdown,
                () = self.timer.fired() => Step::Reconnect,
                cmd = cmd_rx.recv() => Step::Command(cmd),
                frame = next_frame(&mut self.transport) => Step::Frame(frame),
            };

            match step {
                Step::Shutdown => {
                    debug!("shutdown signal received");
                    self.shutdown().await;
                }
                Step::Reconnect => {
                    self.timer.cancel();
                    debug!(endpoint = %self.endpoint, "reconnecting");
                    if self.open(&mut shutdown_rx).await.is_break() {
                        break;
                    }
                }
                Step::Command(Some(outbound)) => self.transmit(outbound).await,
                Step::Command(None) => {
                    debug!("command channel closed, shutting down connection loop");
                    self.shutdown().await;
                }
                Step::Frame(Some(Ok(text))) => self.receive(&text),
                Step::Frame(Some(Err(e))) => {
                    error!("transport receive error: {e}");
                    self.report(ErrorKind::Transport, e.to_string());
                }
                Step::Frame(None) => {
                    debug!("transport closed by server");
                    self.handle_close(Some("connection closed by server".into()));
                }
            }
        }

        self.exit();
    }

    fn exit(&self) {
        self.state.set_running(false);
        debug!("connection loop exited");
    }

    /// Create a transport and move to `Open`, or follow the close path on failure.
    ///
    /// The dial races the shutdown signal; `Break` means the caller asked to
    /// disconnect while connecting and the loop must stop.
    async fn open(&mut self, shutdown_rx: &mut oneshot::Receiver<()>) -> ControlFlow<()> {
        self.state.set_lifecycle(Lifecycle::Connecting);
        let connector = Arc::clone(&self.connector);
        let dialed = tokio::select! {
            biased;
            _ = shutdown_rx => None,
            result = connector.connect(&self.endpoint) => Some(result),
        };
        let Some(result) = dialed else {
            debug!("shutdown signal received while connecting");
            self.shutdown().await;
            return ControlFlow::Break(());
        };
        match result {
            Ok(transport) => {
                self.transport = Some(transport);
                self.state.set_lifecycle(Lifecycle::Open);
                debug!("transport open");
                self.bus.emit(event::CONNECTED, &Event::Connected);
            }
            Err(e) => {
                warn!("connect failed: {e}");
                self.report(ErrorKind::Connect, e.to_string());
                self.handle_close(Some(format!("connect failed: {e}")));
            }
        }
        ControlFlow::Continue(())
    }

    /// Send one message and answer its caller with the outcome.
    async fn transmit(&mut self, outbound: Outbound) {
        let Outbound { message, ack } = outbound;
        let result = self.write(&message).await;
        // A dropped receiver means the caller stopped waiting.
        let _ = ack.send(result);
    }

    async fn write(&mut self, message: &ClientMessage) -> Result<(), CollabError> {
        let Some(transport) = self.transport.as_mut() else {
            debug!(tag = message.tag(), "no open transport, rejecting outbound message");
            return Err(CollabError::NotConnected);
        };
        let text = codec::encode(message)?;
        debug!(tag = message.tag(), "sending message");
        match transport.send(text).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("transport send error: {e}");
                self.report(ErrorKind::Transport, e.to_string());
                Err(e)
            }
        }
    }

    fn receive(&self, text: &str) {
        match codec::decode_inbound(text) {
            Ok(msg) => router::route(&self.bus, &self.state, msg),
            Err(e) => {
                warn!("failed to decode server message: {e}; raw: {text}");
                self.report(ErrorKind::Decode, e.to_string());
            }
        }
    }

    /// Enter `Closed`, emit `disconnected`, and arm the reconnect timer if allowed.
    fn handle_close(&mut self, reason: Option<String>) {
        self.transport = None;
        self.state.mark_closed();

        let will_reconnect = if self.policy.enabled && !self.closed_by_caller {
            if !self.timer.schedule(self.policy.delay) {
                debug!("reconnect already pending");
            }
            true
        } else {
            false
        };
        if !will_reconnect {
            // Lets a new `connect()` start a fresh loop right away.
            self.state.set_running(false);
        }

        self.bus.emit(
            event::DISCONNECTED,
            &Event::Disconnected(DisconnectInfo {
                reason,
                by_caller: self.closed_by_caller,
                will_reconnect,
            }),
        );
    }

    /// Caller-requested close: cancel the timer and close the transport.
    async fn shutdown(&mut self) {
        self.closed_by_caller = true;
        if self.timer.cancel() {
            debug!("cancelled pending reconnect");
        }
        match self.transport.take() {
            Some(mut transport) => {
                if let Err(e) = transport.close().await {
                    debug!("transport close failed: {e}");
                }
                self.handle_close(Some("client disconnected".into()));
            }
            None if self.state.lifecycle() == Lifecycle::Connecting => {
                self.handle_close(Some("client disconnected while connecting".into()));
            }
            None => {
                // Already closed and reported; just make the terminal state visible.
                self.state.mark_closed();
                self.state.set_running(false);
            }
        }
    }

    fn report(&self, kind: ErrorKind, message: String) {
        self.bus
            .emit(event::ERROR, &Event::Error(ErrorEvent { kind, message }));
    }
}

/// Next frame from the transport; never resolves while there is none.
async fn next_frame(
    transport: &mut Option<Box<dyn Transport>>,
) -> Option<Result<String, CollabError>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}
