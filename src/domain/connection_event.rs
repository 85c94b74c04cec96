//! Lifecycle events emitted for every WebSocket connection.
//!
//! Events are published through the [`super::EventBus`] owned by the
//! application handle. Observers may inspect them but cannot veto the
//! connection.

use std::sync::Arc;

use crate::ws::{Connection, RequestContext};

/// Event name emitted before any middleware runs.
pub const PRE_WS_CONNECTION: &str = "preWsConnection";
/// Event name emitted once every middleware chain admitted the connection.
pub const WS_CONNECTION: &str = "wsConnection";
/// Event name emitted once when the connection ends.
pub const WS_CONNECTION_END: &str = "wsConnectionEnd";

/// Connection lifecycle event.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The upgrade completed; middlewares have not run yet.
    PreWsConnection {
        /// The upgraded connection.
        connection: Connection,
        /// Request metadata as seen at upgrade time.
        request: Arc<RequestContext>,
    },

    /// All middleware chains admitted the connection.
    WsConnection {
        /// The admitted connection.
        connection: Connection,
        /// Request metadata after middleware side effects.
        request: Arc<RequestContext>,
    },

    /// The transport reported the end of the connection.
    WsConnectionEnd {
        /// Request metadata of the ended connection.
        request: Arc<RequestContext>,
    },
}

impl ConnectionEvent {
    /// Returns the wire name of this event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PreWsConnection { .. } => PRE_WS_CONNECTION,
            Self::WsConnection { .. } => WS_CONNECTION,
            Self::WsConnectionEnd { .. } => WS_CONNECTION_END,
        }
    }

    /// Returns the request metadata carried by every event.
    #[must_use]
    pub fn request(&self) -> &Arc<RequestContext> {
        match self {
            Self::PreWsConnection { request, .. }
            | Self::WsConnection { request, .. }
            | Self::WsConnectionEnd { request } => request,
        }
    }

    /// Returns the connection, if the event carries one.
    #[must_use]
    pub fn connection(&self) -> Option<&Connection> {
        match self {
            Self::PreWsConnection { connection, .. } | Self::WsConnection { connection, .. } => {
                Some(connection)
            }
            Self::WsConnectionEnd { .. } => None,
        }
    }
}
