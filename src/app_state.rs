//! Application handle threaded through the route binder and every middleware.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::{ConnectionEvent, EventBus};
use crate::middleware::MiddlewareChain;

/// Shared, read-mostly application context.
///
/// Carries the global middleware chain and the event bus. Created once at
/// plugin registration and cloned into every connection; clones share the
/// same state.
#[derive(Debug, Clone)]
pub struct AppHandle {
    /// Event bus for connection lifecycle events.
    pub event_bus: EventBus,
    global_middlewares: Arc<MiddlewareChain>,
    active_connections: Arc<AtomicUsize>,
}

impl AppHandle {
    /// Creates a handle over `event_bus` with the given global chain.
    #[must_use]
    pub fn new(event_bus: EventBus, global_middlewares: MiddlewareChain) -> Self {
        Self {
            event_bus,
            global_middlewares: Arc::new(global_middlewares),
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Middlewares run for every WebSocket route, before route middlewares.
    #[must_use]
    pub fn global_middlewares(&self) -> &MiddlewareChain {
        &self.global_middlewares
    }

    /// Publishes a lifecycle event; returns the number of receivers.
    pub fn emit(&self, event: ConnectionEvent) -> usize {
        self.event_bus.publish(event)
    }

    /// Number of admitted connections that have not ended yet.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub(crate) fn connection_admitted(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_ended(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }
}
