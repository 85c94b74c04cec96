//! Websocket plugin: installs the route shorthands on an [`App`].

use crate::app::App;
use crate::app_state::AppHandle;
use crate::config::TransportOptions;
use crate::error::WsError;
use crate::middleware::{BoxedMiddleware, MiddlewareChain};
use crate::ws::RouteBinder;

/// Capability name of the `ws` shorthand.
pub const WS: &str = "ws";
/// Capability name of the `websocket` shorthand.
pub const WEBSOCKET: &str = "websocket";

/// Installs one route binder under both [`WS`] and [`WEBSOCKET`].
///
/// Nothing is installed if either name is taken.
///
/// # Errors
///
/// Returns [`WsError::DecorationConflict`] if `app` already exposes either
/// name.
pub fn install_capabilities(
    app: &mut App,
    global_middlewares: impl Into<MiddlewareChain>,
    transport: TransportOptions,
) -> Result<RouteBinder, WsError> {
    if let Some(taken) = [WS, WEBSOCKET].into_iter().find(|name| app.has_capability(name)) {
        return Err(WsError::DecorationConflict(taken.to_string()));
    }

    let handle = AppHandle::new(app.event_bus().clone(), global_middlewares.into());
    let binder = RouteBinder::new(handle, transport);
    app.decorate(WS, binder.clone())?;
    app.decorate(WEBSOCKET, binder.clone())?;
    Ok(binder)
}

/// Plugin-level options.
#[derive(Debug, Clone, Default)]
pub struct PluginOptions {
    /// Middlewares run for every WebSocket route, before route middlewares.
    pub global_middlewares: MiddlewareChain,
    /// Transport settings for every upgrade.
    pub transport_options: TransportOptions,
}

impl PluginOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a global middleware.
    #[must_use]
    pub fn global_middleware(mut self, middleware: BoxedMiddleware) -> Self {
        self.global_middlewares.push(middleware);
        self
    }

    /// Sets the transport settings.
    #[must_use]
    pub fn transport_options(mut self, transport_options: TransportOptions) -> Self {
        self.transport_options = transport_options;
        self
    }
}

/// The websocket plugin.
#[derive(Debug, Clone, Default)]
pub struct WebsocketPlugin {
    options: PluginOptions,
}

impl WebsocketPlugin {
    /// Creates the plugin with `options`.
    #[must_use]
    pub fn new(options: PluginOptions) -> Self {
        Self { options }
    }

    /// Registers the plugin on `app`.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::DecorationConflict`] if the shorthands are already
    /// installed.
    pub fn register(self, app: &mut App) -> Result<RouteBinder, WsError> {
        tracing::info!(
            global_middlewares = self.options.global_middlewares.len(),
            "registering websocket plugin"
        );
        install_capabilities(
            app,
            self.options.global_middlewares,
            self.options.transport_options,
        )
    }
}
