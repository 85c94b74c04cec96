//! Domain layer: connection identity and the lifecycle event system.

pub mod connection_event;
pub mod connection_id;
pub mod event_bus;

pub use connection_event::ConnectionEvent;
pub use connection_id::ConnectionId;
pub use event_bus::{DEFAULT_EVENT_BUS_CAPACITY, EventBus};
