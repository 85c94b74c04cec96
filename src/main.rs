//! wsgate demo server entry point.
//!
//! Serves an echo endpoint, a token-guarded endpoint, and `/health`, and
//! logs every connection lifecycle event.

use axum::extract::ws::Message;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use wsgate::api;
use wsgate::config::ServerConfig;
use wsgate::domain::{ConnectionEvent, EventBus};
use wsgate::{
    App, BoxedMiddleware, Connection, PluginOptions, WebsocketPlugin, WsRoute, from_callback,
    keep_alive, socket_send,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = ServerConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting wsgate");

    let mut app = App::new(config.event_bus_capacity);
    spawn_event_logger(app.event_bus());

    // Install the ws / websocket shorthands
    let mut options = PluginOptions::new().transport_options(config.transport);
    if config.global_keep_alive {
        options = options.global_middleware(keep_alive());
    }
    let binder = WebsocketPlugin::new(options).register(&mut app)?;

    app.ws("/ws/echo", WsRoute::new().handler(echo))?;
    app.websocket(
        "/ws/private",
        WsRoute::new()
            .middleware(token_guard(std::env::var("WS_ACCESS_TOKEN").ok()))
            .handler(echo),
    )?;
    app.merge(api::build_router(binder.app().clone()));

    let router = app
        .into_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, router).await?;

    Ok(())
}

/// Echoes every text frame back until the client goes away.
async fn echo(conn: Connection, _req: std::sync::Arc<wsgate::RequestContext>) {
    while let Some(message) = conn.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        if !conn.is_open() {
            break;
        }
        if let Err(err) = socket_send(&conn, text.as_str()) {
            tracing::debug!(connection_id = %conn.id(), error = %err, "echo failed");
            break;
        }
    }
}

/// Admits connections whose `token` query parameter matches `expected`.
/// Without a configured token every connection is rejected.
fn token_guard(expected: Option<String>) -> BoxedMiddleware {
    from_callback(move |_conn, req, _app, decision| {
        let admitted = expected
            .as_deref()
            .is_some_and(|token| req.query("token") == Some(token));
        decision.resolve(admitted);
    })
}

fn spawn_event_logger(event_bus: &EventBus) {
    let mut events = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event logger lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn log_event(event: &ConnectionEvent) {
    let path = event.request().uri().path();
    match event.connection() {
        Some(conn) => tracing::info!(event = event.name(), connection_id = %conn.id(), path, "connection event"),
        None => tracing::info!(event = event.name(), path, "connection event"),
    }
}
