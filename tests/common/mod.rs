#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for collab client integration tests.
//!
//! Provides a scripted [`MockTransport`], a channel-backed
//! [`LoopbackTransport`] driven from the test through a [`LoopbackServer`],
//! a [`BrokenTransport`] whose writes fail, a [`MockConnector`] that hands
//! out queued transports, and helpers for building server message JSON.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use collab_client::event::Event;
use collab_client::{CollabError, Connector, EventBus, Transport};
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ── MockTransport ───────────────────────────────────────────────────

/// A scripted mock transport.
///
/// Scripted server frames are consumed in order by `recv()`; once the script
/// is exhausted `recv()` pends forever. All frames sent by the client are
/// recorded in `sent`.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, CollabError>>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Returns the transport plus shared handles for inspecting sent frames
    /// and whether close was called.
    pub fn new(
        incoming: Vec<Option<Result<String, CollabError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), CollabError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, CollabError>> {
        match self.incoming.pop_front() {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), CollabError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── BrokenTransport ─────────────────────────────────────────────────

/// Delivers its scripted frames, then pends; fails every write.
pub struct BrokenTransport {
    incoming: VecDeque<String>,
}

impl BrokenTransport {
    pub fn new(frames: Vec<Value>) -> Self {
        Self {
            incoming: frames.iter().map(Value::to_string).collect(),
        }
    }
}

#[async_trait]
impl Transport for BrokenTransport {
    async fn send(&mut self, _message: String) -> Result<(), CollabError> {
        Err(CollabError::TransportSend("broken pipe".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, CollabError>> {
        match self.incoming.pop_front() {
            Some(frame) => Some(Ok(frame)),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), CollabError> {
        Ok(())
    }
}

// ── Loopback transport ──────────────────────────────────────────────

/// Client half of an in-memory connection.
pub struct LoopbackTransport {
    from_server: mpsc::UnboundedReceiver<String>,
    to_server: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

/// Test-side half of an in-memory connection.
pub struct LoopbackServer {
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

/// Create a connected transport/server pair.
pub fn loopback() -> (LoopbackTransport, LoopbackServer) {
    let (to_client, from_server) = mpsc::unbounded_channel();
    let (to_server, from_client) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        LoopbackTransport {
            from_server,
            to_server,
            closed: Arc::clone(&closed),
        },
        LoopbackServer {
            to_client: Some(to_client),
            from_client,
            closed,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), CollabError> {
        self.to_server
            .send(message)
            .map_err(|_| CollabError::TransportClosed)
    }

    async fn recv(&mut self) -> Option<Result<String, CollabError>> {
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), CollabError> {
        self.closed.store(true, Ordering::Relaxed);
        self.from_server.close();
        Ok(())
    }
}

impl LoopbackServer {
    /// Deliver one frame to the client.
    pub fn push(&self, frame: impl Into<String>) {
        if let Some(tx) = &self.to_client {
            tx.send(frame.into()).expect("client transport dropped");
        }
    }

    /// Deliver a JSON value to the client.
    pub fn push_json(&self, value: Value) {
        self.push(value.to_string());
    }

    /// Close the connection from the server side.
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }

    /// Next frame the client sent, parsed as JSON. Panics after one second.
    pub async fn next_sent(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(1), self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client transport dropped");
        serde_json::from_str(&frame).expect("client sent invalid JSON")
    }

    /// Every frame the client has sent so far, without waiting.
    pub fn drain_sent(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(serde_json::from_str(&frame).expect("client sent invalid JSON"));
        }
        frames
    }

    /// Whether the client closed its half.
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Outcome of one scripted connect attempt.
enum Attempt {
    Ready(Box<dyn Transport>),
    Refuse,
    /// The dial never completes.
    Hang,
}

/// Hands out queued transports, one per connect attempt, and records the
/// endpoint of every attempt. Fails once the queue is empty.
#[derive(Clone, Default)]
pub struct MockConnector {
    queue: Arc<StdMutex<VecDeque<Attempt>>>,
    endpoints: Arc<StdMutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transport for the next attempt.
    pub fn push(&self, transport: impl Transport) {
        self.queue
            .lock()
            .unwrap()
            .push_back(Attempt::Ready(Box::new(transport)));
    }

    /// Queue a fresh loopback pair and return its server half.
    pub fn push_loopback(&self) -> LoopbackServer {
        let (transport, server) = loopback();
        self.push(transport);
        server
    }

    /// Make the next attempt fail.
    pub fn push_refusal(&self) {
        self.queue.lock().unwrap().push_back(Attempt::Refuse);
    }

    /// Make the next attempt dial forever.
    pub fn push_hang(&self) {
        self.queue.lock().unwrap().push_back(Attempt::Hang);
    }

    /// Endpoints of every attempt so far.
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.endpoints.lock().unwrap().len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, CollabError> {
        self.endpoints.lock().unwrap().push(endpoint.to_owned());
        let attempt = self.queue.lock().unwrap().pop_front();
        match attempt {
            Some(Attempt::Ready(transport)) => Ok(transport),
            Some(Attempt::Refuse) | None => Err(CollabError::TransportClosed),
            Some(Attempt::Hang) => std::future::pending().await,
        }
    }
}

// ── Event recording ─────────────────────────────────────────────────

/// Recorded `(event name, payload)` pairs in emission order.
pub type EventLog = Arc<StdMutex<Vec<(String, Event)>>>;

/// Record every emission of the listed events.
pub fn record(bus: &EventBus, names: &[&str]) -> EventLog {
    let log: EventLog = Arc::new(StdMutex::new(Vec::new()));
    for &name in names {
        let log = Arc::clone(&log);
        let owned = name.to_owned();
        bus.subscribe(name, move |ev| {
            log.lock().unwrap().push((owned.clone(), ev.clone()));
        });
    }
    log
}

/// Names of the recorded events, in order.
pub fn names(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
}

/// Let the connection task run until it has nothing left to do.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ── JSON helper functions ───────────────────────────────────────────

pub fn connection_established_json(client_id: &str, username: &str) -> Value {
    json!({
        "type": "connection_established",
        "clientId": client_id,
        "user": {"id": 1, "username": username},
    })
}

pub fn room_joined_json(room_id: &str) -> Value {
    json!({
        "type": "room_joined",
        "roomId": room_id,
        "currentUsers": [{"id": 1, "username": "al"}],
    })
}

pub fn chat_message_json(id: i64, content: &str) -> Value {
    json!({
        "type": "text_message",
        "id": id,
        "userId": 2,
        "username": "bo",
        "content": content,
        "timestamp": 1_700_000_000_000_i64,
    })
}

pub fn message_history_json(ids: &[i64]) -> Value {
    let messages: Vec<Value> = ids
        .iter()
        .map(|&id| {
            let mut msg = chat_message_json(id, "old");
            if let Some(obj) = msg.as_object_mut() {
                obj.remove("type");
            }
            msg
        })
        .collect();
    json!({"type": "message_history", "messages": messages})
}

pub fn file_list_json(names: &[&str]) -> Value {
    let files: Vec<Value> = names.iter().map(|n| json!({"name": n})).collect();
    json!({"type": "file_list", "files": files})
}
