//! Name-keyed publish/subscribe bus.
//!
//! [`EventBus`] maps an event name to the handlers registered for it and
//! invokes them synchronously, in registration order, on [`emit`](EventBus::emit).
//!
//! - A handler that panics is caught and logged; the remaining handlers for
//!   the same emission still run and the emitter never observes the panic.
//! - Emission works on a snapshot of the handler list, so handlers may
//!   subscribe, unsubscribe or emit re-entrantly.
//! - A one-shot handler deregisters itself before it runs and is guarded by an
//!   atomic flag, so it runs at most once even with concurrent emitters.
//!
//! # Example
//!
//! ```
//! use collab_client::bus::EventBus;
//! use collab_client::event::Event;
//!
//! let bus = EventBus::new();
//! let sub = bus.subscribe("connected", |event| {
//!     assert_eq!(event, &Event::Connected);
//! });
//! assert_eq!(bus.emit("connected", &Event::Connected), 1);
//!
//! sub.unsubscribe();
//! assert_eq!(bus.emit("connected", &Event::Connected), 0);
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{error, trace};

use crate::event::Event;

/// A registered event handler.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Identifies one registration on an [`EventBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Registration {
    id: SubscriptionId,
    handler: Handler,
    /// Cleared on removal. Checked before every invocation.
    active: Arc<AtomicBool>,
    once: bool,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<String, Vec<Registration>>,
}

impl Registry {
    fn remove(&mut self, event: &str, id: SubscriptionId) -> bool {
        let Some(list) = self.handlers.get_mut(event) else {
            return false;
        };
        let Some(pos) = list.iter().position(|r| r.id == id) else {
            return false;
        };
        let reg = list.remove(pos);
        reg.active.store(false, Ordering::Release);
        if list.is_empty() {
            self.handlers.remove(event);
        }
        true
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // Handlers never run under the lock, so a poisoned registry is still consistent.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Event bus handle. Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every emission of `event`.
    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.register(event.into(), Arc::new(handler), false)
    }

    /// Register `handler` for the next emission of `event` only.
    pub fn subscribe_once<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.register(event.into(), Arc::new(handler), true)
    }

    /// Remove a registration. Unknown events and ids are ignored.
    ///
    /// Returns `true` if a handler was removed.
    pub fn unsubscribe(&self, event: &str, id: SubscriptionId) -> bool {
        lock(&self.registry).remove(event, id)
    }

    /// Number of handlers currently registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        lock(&self.registry).handlers.get(event).map_or(0, Vec::len)
    }

    /// Invoke every handler registered for `event` with `payload`.
    ///
    /// Returns the number of handlers invoked, panicking ones included.
    pub fn emit(&self, event: &str, payload: &Event) -> usize {
        let snapshot = match lock(&self.registry).handlers.get(event) {
            Some(list) => list.clone(),
            None => return 0,
        };
        trace!(event, handlers = snapshot.len(), "emit");

        let mut invoked = 0;
        for reg in snapshot {
            if reg.once {
                // Claim, then deregister, before the handler can re-trigger `event`.
                if !reg.active.swap(false, Ordering::AcqRel) {
                    continue;
                }
                lock(&self.registry).remove(event, reg.id);
            } else if !reg.active.load(Ordering::Acquire) {
                continue;
            }

            invoked += 1;
            let handler = &reg.handler;
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                error!(event, "event handler panicked: {}", panic_message(panic.as_ref()));
            }
        }
        invoked
    }

    fn register(&self, event: String, handler: Handler, once: bool) -> Subscription {
        let mut registry = lock(&self.registry);
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry
            .handlers
            .entry(event.clone())
            .or_default()
            .push(Registration {
                id,
                handler,
                active: Arc::new(AtomicBool::new(true)),
                once,
            });
        drop(registry);

        Subscription {
            event,
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = lock(&self.registry);
        let mut events: Vec<(&str, usize)> = registry
            .handlers
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        events.sort_unstable();
        f.debug_struct("EventBus").field("events", &events).finish()
    }
}

/// Handle to one registration, returned by [`EventBus::subscribe`] and
/// [`EventBus::subscribe_once`].
///
/// Dropping the handle does **not** remove the handler; call
/// [`unsubscribe`](Subscription::unsubscribe).
#[derive(Debug, Clone)]
pub struct Subscription {
    event: String,
    id: SubscriptionId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// The event this handler is registered for.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// The registration id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the handler. Returns `false` if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => lock(&registry).remove(&self.event, self.id),
            None => false,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
