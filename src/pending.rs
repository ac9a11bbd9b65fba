//! Correlation of outbound requests with their response events.
//!
//! The protocol carries no request id: a `join_room` is answered by the next
//! `room_joined`, a `get_messages` by the next `message_history`, and so on.
//! Each call registers its own waiter before it sends. Waiters for the same
//! response event are kept in call order, and each response resolves only the
//! oldest one, so concurrent calls of the same operation resolve in turn.
//! Handshake waiters are the exception: one `connection_established`
//! resolves every caller waiting on it.
//!
//! A waiter is removed when it resolves, when its [`PendingRequest`] is
//! dropped (cancellation or timeout), or when a disconnect rejects it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use crate::bus::{EventBus, Subscription};
use crate::error::{CollabError, Result};
use crate::event::{self, DisconnectInfo, Event};
use crate::protocol::ServerMessage;

/// How a response event is handed to its waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Resolve the oldest waiter only.
    Fifo,
    /// Resolve every waiter.
    Broadcast,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Result<ServerMessage>>,
    /// Only rejected by a disconnect that will not be followed by a reconnect.
    survives_reconnect: bool,
}

#[derive(Default)]
struct Waiters {
    by_event: HashMap<&'static str, VecDeque<Waiter>>,
}

/// Registry of pending correlated requests for one client.
pub(crate) struct Correlator {
    next_id: AtomicU64,
    waiters: Mutex<Waiters>,
    reject_on_disconnect: bool,
}

impl Correlator {
    pub(crate) fn new(reject_on_disconnect: bool) -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            waiters: Mutex::new(Waiters::default()),
            reject_on_disconnect,
        })
    }

    /// Subscribe the correlator to each response event and to `disconnected`.
    pub(crate) fn attach(
        self: &Arc<Self>,
        bus: &EventBus,
        routes: &[(&'static str, Delivery)],
    ) -> Vec<Subscription> {
        let mut subscriptions: Vec<Subscription> = routes
            .iter()
            .map(|&(name, delivery)| {
                let this = Arc::clone(self);
                bus.subscribe(name, move |ev| {
                    if let Some(msg) = ev.server_message() {
                        this.resolve(name, delivery, msg);
                    }
                })
            })
            .collect();

        let this = Arc::clone(self);
        subscriptions.push(bus.subscribe(event::DISCONNECTED, move |ev| {
            if let Event::Disconnected(info) = ev {
                this.reject(info);
            }
        }));
        subscriptions
    }

    /// Add a waiter for `event`. Must be called before the request is sent.
    pub(crate) fn register(
        self: &Arc<Self>,
        event: &'static str,
        survives_reconnect: bool,
    ) -> PendingRequest {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.lock()
            .by_event
            .entry(event)
            .or_default()
            .push_back(Waiter {
                id,
                tx,
                survives_reconnect,
            });
        PendingRequest {
            correlator: Arc::clone(self),
            event,
            id,
            rx,
        }
    }

    /// Number of waiters for `event`.
    pub(crate) fn pending(&self, event: &str) -> usize {
        self.lock().by_event.get(event).map_or(0, VecDeque::len)
    }

    fn resolve(&self, event: &'static str, delivery: Delivery, msg: &ServerMessage) {
        let resolved: Vec<Waiter> = {
            let mut waiters = self.lock();
            let Some(queue) = waiters.by_event.get_mut(event) else {
                return;
            };
            let resolved = match delivery {
                Delivery::Fifo => queue.pop_front().into_iter().collect(),
                Delivery::Broadcast => queue.drain(..).collect(),
            };
            if queue.is_empty() {
                waiters.by_event.remove(event);
            }
            resolved
        };
        for waiter in resolved {
            debug!(event, id = waiter.id, "pending request resolved");
            // A dropped receiver means the caller already gave up.
            let _ = waiter.tx.send(Ok(msg.clone()));
        }
    }

    fn reject(&self, info: &DisconnectInfo) {
        if !self.reject_on_disconnect {
            return;
        }
        let rejected: Vec<Waiter> = {
            let mut waiters = self.lock();
            let mut rejected = Vec::new();
            for queue in waiters.by_event.values_mut() {
                let (drop_now, keep): (VecDeque<Waiter>, VecDeque<Waiter>) = queue
                    .drain(..)
                    .partition(|w| !w.survives_reconnect || !info.will_reconnect);
                *queue = keep;
                rejected.extend(drop_now);
            }
            waiters.by_event.retain(|_, queue| !queue.is_empty());
            rejected
        };
        for waiter in rejected {
            debug!(id = waiter.id, "pending request rejected on disconnect");
            let _ = waiter.tx.send(Err(CollabError::Disconnected));
        }
    }

    fn cancel(&self, event: &'static str, id: u64) {
        let mut waiters = self.lock();
        if let Some(queue) = waiters.by_event.get_mut(event) {
            queue.retain(|w| w.id != id);
            if queue.is_empty() {
                waiters.by_event.remove(event);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Waiters> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One in-flight correlated call. Dropping it withdraws the waiter.
pub(crate) struct PendingRequest {
    correlator: Arc<Correlator>,
    event: &'static str,
    id: u64,
    rx: oneshot::Receiver<Result<ServerMessage>>,
}

impl PendingRequest {
    /// Wait for the response, optionally bounded by `timeout`.
    pub(crate) async fn wait(mut self, timeout: Option<Duration>) -> Result<ServerMessage> {
        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, &mut self.rx)
                .await
                .map_err(|_| CollabError::Timeout)?,
            None => (&mut self.rx).await,
        };
        // The sender only disappears with the correlator's client.
        outcome.unwrap_or(Err(CollabError::Disconnected))
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.correlator.cancel(self.event, self.id);
    }
}
