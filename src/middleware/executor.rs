//! Sequential middleware execution with early abort.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;

use super::{BoxedMiddleware, MiddlewareChain};
use crate::app_state::AppHandle;
use crate::error::WsError;
use crate::ws::{Connection, RequestContext};

/// Runs `chain` against `connection`, one middleware at a time.
///
/// Each middleware's decision is awaited before the next one starts, so
/// later middlewares observe the side effects of earlier ones. The first
/// rejection ends the connection and returns `Ok(false)` without running the
/// rest. An empty chain admits without doing anything.
///
/// # Errors
///
/// Returns the first middleware fault unchanged; a middleware that panics
/// is reported as [`WsError::Middleware`]. The connection is left as is;
/// the caller decides how to terminate it.
pub async fn run_chain(
    connection: &Connection,
    request: &Arc<RequestContext>,
    app: &AppHandle,
    chain: &MiddlewareChain,
) -> Result<bool, WsError> {
    for middleware in chain.iter() {
        let passes = admit_guarded(middleware, connection, request, app).await?;

        if !passes {
            tracing::debug!(
                connection_id = %connection.id(),
                middleware = middleware.name(),
                "middleware rejected connection"
            );
            connection.end();
            return Ok(false);
        }
    }

    Ok(true)
}

/// Runs one middleware, turning a panic in either the call or the returned
/// future into a fault scoped to this connection.
async fn admit_guarded(
    middleware: &BoxedMiddleware,
    connection: &Connection,
    request: &Arc<RequestContext>,
    app: &AppHandle,
) -> Result<bool, WsError> {
    let panicked = || WsError::middleware(format!("middleware `{}` panicked", middleware.name()));

    let admit = panic::catch_unwind(AssertUnwindSafe(|| {
        middleware.admit(connection.clone(), Arc::clone(request), app.clone())
    }))
    .map_err(|_| panicked())?;

    AssertUnwindSafe(admit)
        .catch_unwind()
        .await
        .map_err(|_| panicked())?
}
