//! WebSocket route binding and per-connection lifecycle.
//!
//! ```text
//! upgrade ─► preWsConnection ─► global chain ─► route chain ─► wsConnection ─► handler
//!                                   │               │
//!                                   └── reject ─────┴─► connection ended
//! end signal ─► wsConnectionEnd (once, admitted or not)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Path, Request};
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use super::{Connection, Phase, RequestContext, WsRoute, transport};
use crate::app_state::AppHandle;
use crate::config::TransportOptions;
use crate::domain::ConnectionEvent;
use crate::error::WsError;
use crate::middleware::run_chain;

/// Outcome of the admission phase of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Every middleware admitted the connection and the handler ran.
    Admitted,
    /// A middleware rejected the connection; it has been ended.
    Rejected,
}

/// Route-registration capability bound to one application handle.
#[derive(Debug, Clone)]
pub struct RouteBinder {
    app: AppHandle,
    transport: TransportOptions,
}

impl RouteBinder {
    /// Creates a binder for `app` applying `transport` to every upgrade.
    #[must_use]
    pub fn new(app: AppHandle, transport: TransportOptions) -> Self {
        Self { app, transport }
    }

    /// The application handle connections are bound to.
    #[must_use]
    pub fn app(&self) -> &AppHandle {
        &self.app
    }

    /// Registers `url` on `router` as a WebSocket endpoint for `GET`.
    ///
    /// Plain HTTP requests go to the route's `http_handler`, or receive the
    /// fixed "This is a WS endpoint" rejection.
    #[must_use]
    pub fn bind(&self, router: Router, url: &str, route: WsRoute) -> Router {
        tracing::debug!(
            url,
            middlewares = route.middleware_chain().len(),
            "binding websocket route"
        );
        let binder = self.clone();
        let route = Arc::new(route);
        router.route(
            url,
            get(move |request: Request| {
                let binder = binder.clone();
                let route = Arc::clone(&route);
                async move { binder.dispatch(request, route).await }
            }),
        )
    }

    async fn dispatch(self, request: Request, route: Arc<WsRoute>) -> Response {
        let (mut parts, body) = request.into_parts();

        let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => upgrade,
            Err(rejection) => {
                tracing::debug!(uri = %parts.uri, reason = %rejection, "plain HTTP request on websocket route");
                return match route.route_options().plain_http_handler() {
                    Some(handler) => handler(Request::from_parts(parts, body)).await,
                    None => WsError::NotWebSocket.into_response(),
                };
            }
        };

        let params = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
            .await
            .map(|Path(params)| params)
            .unwrap_or_default();
        let request = Arc::new(RequestContext::from_parts(&parts, params));

        self.transport
            .apply(upgrade)
            .on_failed_upgrade(|err| tracing::warn!(error = %err, "websocket upgrade failed"))
            .on_upgrade(move |socket| self.serve(socket, request, route))
    }

    async fn serve(self, socket: WebSocket, request: Arc<RequestContext>, route: Arc<WsRoute>) {
        let (connection, io) = Connection::pair();
        transport::attach(socket, io);
        self.drive(&connection, request, &route).await;
    }

    /// Runs the lifecycle and ends the connection if setup faulted.
    async fn drive(&self, connection: &Connection, request: Arc<RequestContext>, route: &WsRoute) {
        if let Err(err) = self.handle_connection(connection, request, route).await {
            tracing::warn!(connection_id = %connection.id(), error = %err, "connection setup failed");
            connection.end();
        }
    }

    /// Runs the full lifecycle of an upgraded connection.
    ///
    /// Emits `preWsConnection`, runs the global then the route chain,
    /// emits `wsConnection`, registers the `wsConnectionEnd` observer, and
    /// awaits the terminal handler. The end observer is registered for
    /// rejected and faulted connections too.
    ///
    /// # Errors
    ///
    /// Returns the first middleware fault. The connection is not ended here;
    /// the caller decides how to terminate it.
    pub async fn handle_connection(
        &self,
        connection: &Connection,
        request: Arc<RequestContext>,
        route: &WsRoute,
    ) -> Result<Admission, WsError> {
        self.app.emit(ConnectionEvent::PreWsConnection {
            connection: connection.clone(),
            request: Arc::clone(&request),
        });

        let admitted = match self.run_middlewares(connection, &request, route).await {
            Ok(admitted) => admitted,
            Err(err) => {
                self.reject(connection, request);
                return Err(err);
            }
        };
        if !admitted {
            self.reject(connection, request);
            return Ok(Admission::Rejected);
        }

        connection.set_phase(Phase::Admitted);
        self.app.connection_admitted();
        tracing::info!(
            connection_id = %connection.id(),
            path = request.uri().path(),
            "websocket connection admitted"
        );
        self.app.emit(ConnectionEvent::WsConnection {
            connection: connection.clone(),
            request: Arc::clone(&request),
        });
        self.watch_end(connection, Arc::clone(&request), true);

        if let Some(handler) = route.terminal_handler() {
            handler(connection.clone(), request).await;
        }

        Ok(Admission::Admitted)
    }

    async fn run_middlewares(
        &self,
        connection: &Connection,
        request: &Arc<RequestContext>,
        route: &WsRoute,
    ) -> Result<bool, WsError> {
        // Global middlewares always run before route middlewares.
        let global = self.app.global_middlewares();
        if !global.is_empty() {
            connection.set_phase(Phase::GlobalMiddleware);
            if !run_chain(connection, request, &self.app, global).await? {
                return Ok(false);
            }
        }

        let chain = route.middleware_chain();
        if !chain.is_empty() {
            connection.set_phase(Phase::RouteMiddleware);
            if !run_chain(connection, request, &self.app, chain).await? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn reject(&self, connection: &Connection, request: Arc<RequestContext>) {
        connection.set_phase(Phase::Rejected);
        tracing::debug!(connection_id = %connection.id(), "websocket connection rejected");
        self.watch_end(connection, request, false);
    }

    fn watch_end(&self, connection: &Connection, request: Arc<RequestContext>, admitted: bool) {
        let app = self.app.clone();
        let connection_id = connection.id();
        connection.on_end(move || {
            if admitted {
                app.connection_ended();
            }
            tracing::info!(connection_id = %connection_id, admitted, "websocket connection ended");
            app.emit(ConnectionEvent::WsConnectionEnd { request });
        });
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::extract::ws::Message;
    use parking_lot::Mutex;
    use tokio::sync::broadcast;
    use tokio::time;

    use super::*;
    use crate::domain::EventBus;
    use crate::middleware::{BoxedMiddleware, MiddlewareChain, from_callback, from_fn, keep_alive};
    use crate::ws::{ReadyState, TransportIo, socket_send};

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(log: &Log, label: &'static str, admit: bool) -> BoxedMiddleware {
        let log = Arc::clone(log);
        from_fn(move |_conn, _req, _app| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(label.to_string());
                Ok(admit)
            }
        })
    }

    fn binder(global: MiddlewareChain) -> RouteBinder {
        RouteBinder::new(
            AppHandle::new(EventBus::new(64), global),
            TransportOptions::default(),
        )
    }

    fn open_connection() -> (Connection, TransportIo) {
        let (conn, io) = Connection::pair();
        io.open();
        (conn, io)
    }

    fn drain_names(rx: &mut broadcast::Receiver<ConnectionEvent>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        names
    }

    #[tokio::test]
    async fn admitted_connection_runs_global_route_then_handler() {
        let log = Log::default();
        let binder = binder(MiddlewareChain::from(recording(&log, "global", true)));
        let mut events = binder.app().event_bus.subscribe();

        let handler_log = Arc::clone(&log);
        let route = WsRoute::new()
            .middleware(recording(&log, "route", true))
            .handler(move |_conn, _req| {
                let log = Arc::clone(&handler_log);
                async move { log.lock().push("handler".to_string()) }
            });
        let (conn, io) = open_connection();

        let outcome = binder
            .handle_connection(&conn, Arc::new(RequestContext::for_path("/ws")), &route)
            .await;

        assert!(matches!(outcome, Ok(Admission::Admitted)));
        assert_eq!(log.lock().as_slice(), ["global", "route", "handler"]);
        assert_eq!(conn.phase(), Phase::Admitted);
        assert_eq!(binder.app().active_connections(), 1);
        assert_eq!(drain_names(&mut events), ["preWsConnection", "wsConnection"]);

        io.signal_end();
        io.signal_end();
        assert_eq!(drain_names(&mut events), ["wsConnectionEnd"]);
        assert_eq!(binder.app().active_connections(), 0);
    }

    #[tokio::test]
    async fn global_rejection_skips_route_chain_and_handler() {
        let log = Log::default();
        let binder = binder(MiddlewareChain::from(recording(&log, "deny", false)));
        let mut events = binder.app().event_bus.subscribe();

        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        let route = WsRoute::new()
            .middleware(recording(&log, "route", true))
            .handler(move |_conn, _req| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });
        let (conn, io) = open_connection();

        let outcome = binder
            .handle_connection(&conn, Arc::new(RequestContext::for_path("/ws")), &route)
            .await;

        assert!(matches!(outcome, Ok(Admission::Rejected)));
        assert_eq!(log.lock().as_slice(), ["deny"]);
        assert_eq!(handled.load(Ordering::SeqCst), 0);
        assert_eq!(conn.ready_state(), ReadyState::Closing);
        assert_eq!(conn.phase(), Phase::Rejected);
        assert_eq!(drain_names(&mut events), ["preWsConnection"]);

        // The transport answers the close; the end event still fires once.
        io.signal_end();
        assert_eq!(drain_names(&mut events), ["wsConnectionEnd"]);
        assert_eq!(binder.app().active_connections(), 0);
    }

    #[tokio::test]
    async fn route_rejection_stops_before_admission() {
        let log = Log::default();
        let binder = binder(MiddlewareChain::new());
        let mut events = binder.app().event_bus.subscribe();
        let route = WsRoute::new().middleware(vec![
            recording(&log, "first", true),
            recording(&log, "deny", false),
            recording(&log, "never", true),
        ]);
        let (conn, _io) = open_connection();

        let outcome = binder
            .handle_connection(&conn, Arc::new(RequestContext::for_path("/ws")), &route)
            .await;

        assert!(matches!(outcome, Ok(Admission::Rejected)));
        assert_eq!(log.lock().as_slice(), ["first", "deny"]);
        assert_eq!(drain_names(&mut events), ["preWsConnection"]);
    }

    #[tokio::test]
    async fn pre_event_is_visible_to_the_first_middleware() {
        let binder = binder(MiddlewareChain::new());
        let observer = Arc::new(Mutex::new(binder.app().event_bus.subscribe()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let probe_observer = Arc::clone(&observer);
        let probe_seen = Arc::clone(&seen);
        let probe = from_fn(move |_conn, _req, _app| {
            let names = drain_names(&mut probe_observer.lock());
            probe_seen.lock().extend(names);
            async { Ok(true) }
        });
        let route = WsRoute::new().middleware(probe);
        let (conn, _io) = open_connection();

        let outcome = binder
            .handle_connection(&conn, Arc::new(RequestContext::for_path("/ws")), &route)
            .await;

        assert!(matches!(outcome, Ok(Admission::Admitted)));
        assert_eq!(seen.lock().as_slice(), ["preWsConnection"]);
        assert_eq!(drain_names(&mut observer.lock()), ["wsConnection"]);
    }

    #[tokio::test]
    async fn fault_aborts_setup_but_still_reports_end() {
        let binder = binder(MiddlewareChain::new());
        let mut events = binder.app().event_bus.subscribe();
        let route = WsRoute::new().middleware(from_fn(|_conn, _req, _app| async {
            Err(WsError::middleware("auth backend down"))
        }));
        let (conn, io) = open_connection();

        let outcome = binder
            .handle_connection(&conn, Arc::new(RequestContext::for_path("/ws")), &route)
            .await;

        assert!(matches!(outcome, Err(WsError::Middleware(_))));
        assert_eq!(conn.phase(), Phase::Rejected);
        io.signal_end();
        assert_eq!(drain_names(&mut events), ["preWsConnection", "wsConnectionEnd"]);
    }

    #[tokio::test]
    async fn route_without_handler_is_valid() {
        let binder = binder(MiddlewareChain::new());
        let (conn, _io) = open_connection();
        let outcome = binder
            .handle_connection(&conn, Arc::new(RequestContext::for_path("/ws")), &WsRoute::new())
            .await;
        assert!(matches!(outcome, Ok(Admission::Admitted)));
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn panicking_middleware_ends_the_connection_and_reports_end() {
        let binder = binder(MiddlewareChain::new());
        let mut events = binder.app().event_bus.subscribe();
        let route = WsRoute::new().middleware(from_fn(|_conn, _req, _app| async {
            if true {
                panic!("middleware exploded");
            }
            Ok(true)
        }));
        let (conn, mut io) = open_connection();

        binder
            .drive(&conn, Arc::new(RequestContext::for_path("/ws")), &route)
            .await;

        assert_eq!(conn.ready_state(), ReadyState::Closing);
        assert_eq!(conn.phase(), Phase::Rejected);
        assert!(matches!(io.try_next_outbound(), Some(Message::Close(None))));

        io.signal_end();
        assert_eq!(drain_names(&mut events), ["preWsConnection", "wsConnectionEnd"]);
        assert_eq!(binder.app().active_connections(), 0);
    }

    #[tokio::test]
    async fn panicking_callback_in_global_chain_is_contained() {
        let binder = binder(MiddlewareChain::from(from_callback(
            |_conn, _req, _app, _decision| panic!("callback exploded"),
        )));
        let mut events = binder.app().event_bus.subscribe();
        let (conn, io) = open_connection();

        binder
            .drive(&conn, Arc::new(RequestContext::for_path("/ws")), &WsRoute::new())
            .await;

        assert_eq!(conn.ready_state(), ReadyState::Closing);
        io.signal_end();
        assert_eq!(drain_names(&mut events), ["preWsConnection", "wsConnectionEnd"]);
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_route_admits_echoes_and_beats() {
        let binder = binder(MiddlewareChain::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let route = WsRoute::new().middleware(keep_alive()).handler(
            move |conn: Connection, _req: Arc<RequestContext>| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    while let Some(message) = conn.recv().await {
                        if let Message::Text(text) = message {
                            let _ = socket_send(&conn, text.as_str());
                        }
                    }
                }
            },
        );
        let (conn, mut io) = open_connection();

        let task = tokio::spawn({
            let binder = binder.clone();
            let conn = conn.clone();
            async move {
                binder
                    .handle_connection(&conn, Arc::new(RequestContext::for_path("/ws")), &route)
                    .await
            }
        });

        time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(io.push_inbound(Message::text("hi")));
        time::sleep(Duration::from_millis(1)).await;

        let mut texts = Vec::new();
        while let Some(message) = io.try_next_outbound() {
            let Message::Text(text) = message else {
                panic!("unexpected frame {message:?}");
            };
            texts.push(text.as_str().to_string());
        }
        assert_eq!(texts, ["", "hi"]);

        io.signal_end();
        let Ok(Ok(Admission::Admitted)) = task.await else {
            panic!("handler returns after the end");
        };
        assert_eq!(binder.app().active_connections(), 0);
    }
}
