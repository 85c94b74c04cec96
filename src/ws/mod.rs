//! WebSocket layer: connections, request metadata, routes, and the binder
//! that drives each connection through its middleware lifecycle.

pub mod binder;
pub mod connection;
pub mod request;
pub mod route;
pub mod send;
pub mod transport;

pub use binder::{Admission, RouteBinder};
pub use connection::{Connection, Phase, ReadyState, TransportIo};
pub use request::RequestContext;
pub use route::{WsRoute, WsRouteOptions};
pub use send::{Payload, SocketSend, socket_send};
