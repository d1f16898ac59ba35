//! Typed publish/subscribe facility for domain events.
//!
//! Decouples transport and state-management code from presentation code.
//! Handlers are invoked synchronously, in registration order, on the same
//! tick as the snapshot replacement that triggered them; no batching or
//! debouncing happens here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::domain::{EventKind, RoomEvent};

type Handler = Arc<dyn Fn(&RoomEvent) + Send + Sync>;

struct Registration {
    id: u64,
    handler: Handler,
}

/// Event dispatcher keyed by [`EventKind`]
pub struct EventDispatcher {
    handlers: Mutex<HashMap<EventKind, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for one event kind.
    ///
    /// # Returns
    ///
    /// A [`Subscription`] handle. Call [`Subscription::unsubscribe`] to
    /// remove the handler deterministically; dropping the handle without
    /// calling it leaves the subscription active.
    pub fn subscribe(
        self: &Arc<Self>,
        kind: EventKind,
        handler: impl Fn(&RoomEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        handlers.entry(kind).or_default().push(Registration {
            id,
            handler: Arc::new(handler),
        });
        Subscription {
            dispatcher: Arc::downgrade(self),
            kind,
            id,
        }
    }

    /// Deliver an event to all handlers registered for its kind.
    ///
    /// The handler list is cloned out of the lock before invocation, so
    /// handlers may subscribe or unsubscribe re-entrantly; such changes take
    /// effect from the next emission.
    pub fn emit(&self, event: &RoomEvent) {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            handlers
                .get(&event.kind())
                .map(|registrations| {
                    registrations
                        .iter()
                        .map(|r| Arc::clone(&r.handler))
                        .collect()
                })
                .unwrap_or_default()
        };

        for handler in snapshot {
            handler(event);
        }
    }

    fn remove(&self, kind: EventKind, id: u64) {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(registrations) = handlers.get_mut(&kind) {
            registrations.retain(|r| r.id != id);
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for a registered event handler
#[derive(Debug)]
pub struct Subscription {
    dispatcher: Weak<EventDispatcher>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    /// Remove the handler from the dispatcher
    pub fn unsubscribe(self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.remove(self.kind, self.id);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let count: usize = handlers.values().map(Vec::len).sum();
        f.debug_struct("EventDispatcher")
            .field("handler_count", &count)
            .finish()
    }
}
