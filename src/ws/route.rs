//! Route registration: middleware chain, options, and terminal handler.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::handler::Handler;
use axum::response::Response;
use futures_util::future::BoxFuture;

use super::{Connection, RequestContext};
use crate::middleware::MiddlewareChain;

/// Application function that takes over a fully admitted connection.
pub type TerminalHandler =
    Arc<dyn Fn(Connection, Arc<RequestContext>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handler for plain HTTP requests that reach a WebSocket route.
pub type HttpHandler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Per-route options.
#[derive(Clone, Default)]
pub struct WsRouteOptions {
    http_handler: Option<HttpHandler>,
}

impl WsRouteOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves plain HTTP requests on the route with any axum handler instead
    /// of the default rejection.
    #[must_use]
    pub fn http_handler<H, T>(mut self, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.http_handler = Some(Arc::new(
            move |request: Request| -> BoxFuture<'static, Response> {
                Box::pin(handler.clone().call(request, ()))
            },
        ));
        self
    }

    pub(crate) fn plain_http_handler(&self) -> Option<&HttpHandler> {
        self.http_handler.as_ref()
    }
}

impl fmt::Debug for WsRouteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsRouteOptions")
            .field("http_handler", &self.http_handler.is_some())
            .finish()
    }
}

/// Everything registered for one WebSocket URL besides the URL itself.
///
/// Immutable once bound.
#[derive(Clone, Default)]
pub struct WsRoute {
    middleware: MiddlewareChain,
    options: WsRouteOptions,
    handler: Option<TerminalHandler>,
}

impl WsRoute {
    /// Creates a route with no middleware, default options, and no handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the route middleware: a single middleware, a `Vec`, an `Option`,
    /// or a ready-made [`MiddlewareChain`].
    #[must_use]
    pub fn middleware(mut self, middleware: impl Into<MiddlewareChain>) -> Self {
        self.middleware = middleware.into();
        self
    }

    /// Sets the route options.
    #[must_use]
    pub fn options(mut self, options: WsRouteOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the terminal handler.
    #[must_use]
    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Connection, Arc<RequestContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handler = Some(Arc::new(
            move |connection: Connection, request: Arc<RequestContext>| -> BoxFuture<'static, ()> {
                Box::pin(handler(connection, request))
            },
        ));
        self
    }

    /// Route middleware chain.
    #[must_use]
    pub fn middleware_chain(&self) -> &MiddlewareChain {
        &self.middleware
    }

    /// Route options.
    #[must_use]
    pub fn route_options(&self) -> &WsRouteOptions {
        &self.options
    }

    /// Terminal handler, if any.
    #[must_use]
    pub fn terminal_handler(&self) -> Option<&TerminalHandler> {
        self.handler.as_ref()
    }
}

impl fmt::Debug for WsRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsRoute")
            .field("middleware", &self.middleware)
            .field("options", &self.options)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}
