//! Event listener registry
//!
//! Listeners subscribe to one event kind or to every event. Dispatch runs
//! each listener separately: an error or a panic in one is logged and does
//! not stop the others or touch the state machine.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use call_assist_core::{CallEvent, CallState, EventKind};
use parking_lot::RwLock;

/// Event listener
pub type Listener = Arc<dyn Fn(&CallEvent, &CallState) -> anyhow::Result<()> + Send + Sync>;

/// Handle for removing a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    /// `None` subscribes to every event
    kind: Option<EventKind>,
    listener: Listener,
}

#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one event kind
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&CallEvent, &CallState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(listener))
    }

    /// Subscribe to every event
    pub fn on_any<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CallEvent, &CallState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(None, Arc::new(listener))
    }

    fn register(&self, kind: Option<EventKind>, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Registration { id, kind, listener });
        id
    }

    /// Remove a listener; false if it was not registered
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Dispatch `event` to matching listeners; returns how many failed
    pub fn emit(&self, event: &CallEvent, state: &CallState) -> usize {
        let kind = event.kind();
        // Listeners run outside the lock so they may (un)register others
        let targets: Vec<(ListenerId, Listener)> = self
            .listeners
            .read()
            .iter()
            .filter(|r| r.kind.map_or(true, |k| k == kind))
            .map(|r| (r.id, r.listener.clone()))
            .collect();

        let mut failures = 0;
        for (id, listener) in targets {
            match catch_unwind(AssertUnwindSafe(|| listener(event, state))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::warn!(
                        call_id = %state.call_id,
                        event = %kind,
                        listener = id.0,
                        error = %e,
                        "Event listener failed"
                    );
                }
                Err(_) => {
                    failures += 1;
                    tracing::error!(
                        call_id = %state.call_id,
                        event = %kind,
                        listener = id.0,
                        "Event listener panicked"
                    );
                }
            }
        }
        failures
    }
}
