//! Connection admission middlewares.
//!
//! A middleware inspects a freshly upgraded [`Connection`], its
//! [`RequestContext`], and the [`AppHandle`], and decides whether the
//! connection may proceed. Two calling conventions are supported and both
//! normalize to the same [`Middleware`] trait when constructed:
//!
//! - [`from_fn`]: an async closure returning `Result<bool, WsError>`.
//! - [`from_callback`]: a plain closure handed a [`Decision`] resolver it
//!   completes whenever it is ready.
//!
//! Middlewares run in order through [`executor::run_chain`]. `Ok(false)`
//! rejects the connection; `Err(_)` or a panic is a fault that aborts the
//! setup.

pub mod executor;
pub mod keep_alive;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

use crate::app_state::AppHandle;
use crate::error::WsError;
use crate::ws::{Connection, RequestContext};

pub use executor::run_chain;
pub use keep_alive::{KeepAlive, KeepAliveHandle, keep_alive};

/// Admission gatekeeper for WebSocket connections.
pub trait Middleware: Send + Sync + 'static {
    /// Decides whether `connection` may proceed.
    ///
    /// Resolves to `Ok(true)` to admit, `Ok(false)` to reject. A middleware
    /// that never resolves stalls the connection; no timeout is applied.
    fn admit(
        &self,
        connection: Connection,
        request: Arc<RequestContext>,
        app: AppHandle,
    ) -> BoxFuture<'static, Result<bool, WsError>>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Shared, type-erased middleware.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Middleware built from an async closure. See [`from_fn`].
pub struct FnMiddleware<F> {
    name: &'static str,
    f: F,
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Connection, Arc<RequestContext>, AppHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, WsError>> + Send + 'static,
{
    fn admit(
        &self,
        connection: Connection,
        request: Arc<RequestContext>,
        app: AppHandle,
    ) -> BoxFuture<'static, Result<bool, WsError>> {
        Box::pin((self.f)(connection, request, app))
    }

    fn name(&self) -> &str {
        self.name
    }
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Wraps an async closure as a middleware.
///
/// ```ignore
/// let only_get = middleware::from_fn(|_conn, req, _app| async move {
///     Ok(req.method() == axum::http::Method::GET)
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> BoxedMiddleware
where
    F: Fn(Connection, Arc<RequestContext>, AppHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, WsError>> + Send + 'static,
{
    Arc::new(FnMiddleware {
        name: std::any::type_name::<F>(),
        f,
    })
}

/// One-shot admission resolver handed to callback-style middlewares.
///
/// Consuming `self` guarantees a single decision. Dropping it without
/// deciding is reported as [`WsError::DecisionDropped`].
pub struct Decision {
    tx: oneshot::Sender<Result<bool, WsError>>,
}

impl Decision {
    /// Submits the admission decision.
    pub fn resolve(self, admit: bool) {
        let _ = self.tx.send(Ok(admit));
    }

    /// Admits the connection.
    pub fn pass(self) {
        self.resolve(true);
    }

    /// Rejects the connection.
    pub fn reject(self) {
        self.resolve(false);
    }

    /// Fails the middleware, aborting the connection setup.
    pub fn fail(self, error: WsError) {
        let _ = self.tx.send(Err(error));
    }
}

impl fmt::Debug for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decision")
            .field("resolved", &self.tx.is_closed())
            .finish()
    }
}

/// Middleware built from a callback-style closure. See [`from_callback`].
pub struct CallbackMiddleware<F> {
    name: &'static str,
    f: F,
}

impl<F> Middleware for CallbackMiddleware<F>
where
    F: Fn(Connection, Arc<RequestContext>, AppHandle, Decision) + Send + Sync + 'static,
{
    fn admit(
        &self,
        connection: Connection,
        request: Arc<RequestContext>,
        app: AppHandle,
    ) -> BoxFuture<'static, Result<bool, WsError>> {
        let (tx, rx) = oneshot::channel();
        (self.f)(connection, request, app, Decision { tx });
        let name = self.name;
        Box::pin(async move {
            rx.await
                .map_err(|_| WsError::DecisionDropped(name.to_string()))?
        })
    }

    fn name(&self) -> &str {
        self.name
    }
}

impl<F> fmt::Debug for CallbackMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackMiddleware")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Wraps a callback-style closure as a middleware.
///
/// The closure may resolve the [`Decision`] synchronously or move it into a
/// spawned task and resolve it later.
pub fn from_callback<F>(f: F) -> BoxedMiddleware
where
    F: Fn(Connection, Arc<RequestContext>, AppHandle, Decision) + Send + Sync + 'static,
{
    Arc::new(CallbackMiddleware {
        name: std::any::type_name::<F>(),
        f,
    })
}

/// Ordered sequence of middlewares evaluated with short-circuit on reject.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<BoxedMiddleware>,
}

impl MiddlewareChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware.
    #[must_use]
    pub fn with(mut self, middleware: BoxedMiddleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Appends a middleware in place.
    pub fn push(&mut self, middleware: BoxedMiddleware) {
        self.middlewares.push(middleware);
    }

    /// Number of middlewares.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if the chain has no middlewares.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Iterates over the middlewares in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &BoxedMiddleware> {
        self.middlewares.iter()
    }

    /// Middleware names in evaluation order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl From<BoxedMiddleware> for MiddlewareChain {
    fn from(middleware: BoxedMiddleware) -> Self {
        Self {
            middlewares: vec![middleware],
        }
    }
}

impl From<Vec<BoxedMiddleware>> for MiddlewareChain {
    fn from(middlewares: Vec<BoxedMiddleware>) -> Self {
        Self { middlewares }
    }
}

impl From<Option<BoxedMiddleware>> for MiddlewareChain {
    fn from(middleware: Option<BoxedMiddleware>) -> Self {
        middleware.map(Self::from).unwrap_or_default()
    }
}

impl FromIterator<BoxedMiddleware> for MiddlewareChain {
    fn from_iter<I: IntoIterator<Item = BoxedMiddleware>>(iter: I) -> Self {
        Self {
            middlewares: iter.into_iter().collect(),
        }
    }
}
