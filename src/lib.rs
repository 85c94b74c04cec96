//! # wsgate
//!
//! Connection-lifecycle middleware pipeline for axum WebSocket endpoints.
//!
//! Every inbound upgrade on a route registered through the `ws` (or
//! `websocket`) shorthand runs a chain of admission middlewares, global
//! first and then per-route, before the connection is handed to the route's
//! terminal handler. The first middleware to reject ends the connection.
//! A built-in keep-alive middleware keeps idle connections open through
//! proxies with idle timeouts.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── App: axum Router + capabilities (app, plugin)
//!     │
//!     ├── RouteBinder (ws/binder)
//!     │     ├── global MiddlewareChain ─┐
//!     │     ├── route MiddlewareChain ──┴─ run_chain (middleware/executor)
//!     │     └── terminal handler
//!     │
//!     ├── EventBus: preWsConnection / wsConnection / wsConnectionEnd (domain)
//!     │
//!     └── Connection ◄─► transport pump ◄─► axum WebSocket (ws)
//! ```

pub mod api;
pub mod app;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod middleware;
pub mod plugin;
pub mod ws;

pub use app::App;
pub use app_state::AppHandle;
pub use error::WsError;
pub use middleware::{
    BoxedMiddleware, Decision, Middleware, MiddlewareChain, from_callback, from_fn, keep_alive,
};
pub use plugin::{PluginOptions, WebsocketPlugin};
pub use ws::{Connection, RequestContext, WsRoute, WsRouteOptions, socket_send};
