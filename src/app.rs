//! Host application: an axum [`Router`] plus named route capabilities.
//!
//! Plugins install capabilities on the [`App`] by name; the `ws` and
//! `websocket` shorthands resolve them at route-registration time.

use std::collections::HashMap;
use std::fmt;

use axum::Router;
use axum::routing::MethodRouter;

use crate::domain::EventBus;
use crate::error::WsError;
use crate::plugin::{WEBSOCKET, WS};
use crate::ws::{RouteBinder, WsRoute};

/// Application under construction.
pub struct App {
    router: Router,
    event_bus: EventBus,
    capabilities: HashMap<String, RouteBinder>,
}

impl App {
    /// Creates an empty application whose event bus holds up to
    /// `event_bus_capacity` undelivered events per subscriber.
    #[must_use]
    pub fn new(event_bus_capacity: usize) -> Self {
        Self {
            router: Router::new(),
            event_bus: EventBus::new(event_bus_capacity),
            capabilities: HashMap::new(),
        }
    }

    /// The application-wide event bus.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Installs `binder` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::DecorationConflict`] if `name` is already taken.
    pub fn decorate(&mut self, name: &str, binder: RouteBinder) -> Result<(), WsError> {
        if self.capabilities.contains_key(name) {
            return Err(WsError::DecorationConflict(name.to_string()));
        }
        tracing::debug!(capability = name, "installing capability");
        self.capabilities.insert(name.to_string(), binder);
        Ok(())
    }

    /// Returns `true` if a capability named `name` is installed.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// Looks up an installed capability.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::MissingCapability`] if nothing is installed under
    /// `name`.
    pub fn capability(&self, name: &str) -> Result<&RouteBinder, WsError> {
        self.capabilities
            .get(name)
            .ok_or_else(|| WsError::MissingCapability(name.to_string()))
    }

    /// Registers a WebSocket route through the capability named `capability`.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::MissingCapability`] if it is not installed.
    pub fn bind_with(
        &mut self,
        capability: &str,
        url: &str,
        route: WsRoute,
    ) -> Result<&mut Self, WsError> {
        let binder = self.capability(capability)?.clone();
        let router = std::mem::take(&mut self.router);
        self.router = binder.bind(router, url, route);
        Ok(self)
    }

    /// Registers a WebSocket route at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::MissingCapability`] if the websocket plugin has
    /// not been registered.
    pub fn ws(&mut self, url: &str, route: WsRoute) -> Result<&mut Self, WsError> {
        self.bind_with(WS, url, route)
    }

    /// Same as [`App::ws`].
    ///
    /// # Errors
    ///
    /// Returns [`WsError::MissingCapability`] if the websocket plugin has
    /// not been registered.
    pub fn websocket(&mut self, url: &str, route: WsRoute) -> Result<&mut Self, WsError> {
        self.bind_with(WEBSOCKET, url, route)
    }

    /// Adds a plain HTTP route.
    pub fn route(&mut self, path: &str, method_router: MethodRouter) -> &mut Self {
        let router = std::mem::take(&mut self.router);
        self.router = router.route(path, method_router);
        self
    }

    /// Merges an existing router.
    pub fn merge(&mut self, other: Router) -> &mut Self {
        let router = std::mem::take(&mut self.router);
        self.router = router.merge(other);
        self
    }

    /// Finishes the build.
    #[must_use]
    pub fn into_router(self) -> Router {
        self.router
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut capabilities: Vec<&str> = self.capabilities.keys().map(String::as_str).collect();
        capabilities.sort_unstable();
        f.debug_struct("App")
            .field("capabilities", &capabilities)
            .field("event_subscribers", &self.event_bus.receiver_count())
            .finish_non_exhaustive()
    }
}
