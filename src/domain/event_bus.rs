//! Fan-out of connection lifecycle events.
//!
//! The route binder emits one [`ConnectionEvent`] per lifecycle step. Any
//! number of observers may listen; none of them can influence admission.

use tokio::sync::broadcast;

use super::ConnectionEvent;

/// Events buffered per observer when nothing else is configured.
pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

/// Shared handle to the lifecycle event channel.
///
/// Clones publish into the same channel. Observers that fall more than the
/// capacity behind lose the oldest events and see
/// [`broadcast::error::RecvError::Lagged`].
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ConnectionEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per observer
    /// (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emits `event` to every current observer and returns how many there
    /// were. With no observers the event is discarded.
    pub fn publish(&self, event: ConnectionEvent) -> usize {
        let name = event.name();
        match self.tx.send(event) {
            Ok(observers) => {
                tracing::trace!(event = name, observers, "connection event emitted");
                observers
            }
            Err(_) => 0,
        }
    }

    /// Starts observing. Only events emitted after this call are delivered.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.tx.subscribe()
    }

    /// Number of live observers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ws::RequestContext;

    fn ended(path: &str) -> ConnectionEvent {
        ConnectionEvent::WsConnectionEnd {
            request: Arc::new(RequestContext::for_path(path)),
        }
    }

    #[test]
    fn events_without_observers_are_discarded() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(ended("/ws")), 0);
    }

    #[tokio::test]
    async fn every_observer_sees_the_event() {
        let bus = EventBus::new(4);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(ended("/chat")), 2);

        for rx in [&mut first, &mut second] {
            let Ok(event) = rx.recv().await else {
                panic!("observer missed the event");
            };
            assert_eq!(event.name(), "wsConnectionEnd");
            assert_eq!(event.request().uri().path(), "/chat");
        }
    }

    #[test]
    fn late_observer_only_sees_later_events() {
        let bus = EventBus::new(4);
        let mut early = bus.subscribe();
        bus.publish(ended("/before"));

        let mut late = bus.subscribe();
        assert!(late.try_recv().is_err());
        assert!(early.try_recv().is_ok());
        assert_eq!(bus.receiver_count(), 2);

        drop(early);
        assert_eq!(bus.receiver_count(), 1);
    }

    #[test]
    fn slow_observer_lags_instead_of_blocking() {
        let bus = EventBus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(ended("/one"));
        bus.publish(ended("/two"));

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(1))
        ));
        let Ok(event) = rx.try_recv() else {
            panic!("newest event is kept");
        };
        assert_eq!(event.request().uri().path(), "/two");
    }
}
