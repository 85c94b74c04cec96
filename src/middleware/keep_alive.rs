//! Keep-alive heartbeat.
//!
//! Reverse proxies close idle connections (nginx does so after 30 s by
//! default). Once armed, the heartbeat sends an empty text frame every
//! [`KEEP_ALIVE_INTERVAL`] while the connection is open, until the
//! connection ends or the handle is cancelled.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{BoxedMiddleware, Middleware};
use crate::app_state::AppHandle;
use crate::error::WsError;
use crate::ws::send::socket_send;
use crate::ws::{Connection, RequestContext};

/// Period between keep-alive frames.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Cancellable handle to a connection's heartbeat timer.
#[derive(Debug, Clone)]
pub struct KeepAliveHandle {
    cancel: CancellationToken,
}

impl KeepAliveHandle {
    /// Stops the heartbeat. Safe to call more than once.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the heartbeat has stopped or will never start.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Arms the heartbeat for `connection` and returns its handle.
///
/// Arming is idempotent per connection: later calls return the handle of
/// the timer armed first. An already-ended connection gets a cancelled
/// handle and no timer.
///
/// Must be called from within a tokio runtime.
pub fn arm(connection: &Connection) -> KeepAliveHandle {
    connection
        .keep_alive_slot()
        .get_or_init(|| start(connection))
        .clone()
}

fn start(connection: &Connection) -> KeepAliveHandle {
    let cancel = CancellationToken::new();
    let handle = KeepAliveHandle {
        cancel: cancel.clone(),
    };
    if connection.is_ended() {
        cancel.cancel();
        return handle;
    }

    let on_end = cancel.clone();
    connection.on_end(move || on_end.cancel());

    let conn = connection.clone();
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + KEEP_ALIVE_INTERVAL, KEEP_ALIVE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    // Not open is usually transient; only the end stops the timer.
                    if !conn.is_open() {
                        continue;
                    }
                    if let Err(err) = socket_send(&conn, "") {
                        tracing::debug!(connection_id = %conn.id(), error = %err, "keep-alive send failed");
                    }
                }
            }
        }
        tracing::trace!(connection_id = %conn.id(), "keep-alive stopped");
    });

    handle
}

/// Middleware that arms the heartbeat and always admits.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAlive;

impl Middleware for KeepAlive {
    fn admit(
        &self,
        connection: Connection,
        _request: Arc<RequestContext>,
        _app: AppHandle,
    ) -> BoxFuture<'static, Result<bool, WsError>> {
        arm(&connection);
        Box::pin(async { Ok(true) })
    }

    fn name(&self) -> &str {
        "keep_alive"
    }
}

/// Returns the keep-alive middleware, ready to mount in any chain.
#[must_use]
pub fn keep_alive() -> BoxedMiddleware {
    Arc::new(KeepAlive)
}
