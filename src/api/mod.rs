//! Plain HTTP endpoints served next to the WebSocket routes.

pub mod system;

use axum::Router;

use crate::app_state::AppHandle;

/// Builds the HTTP router, bound to the application handle.
pub fn build_router(app: AppHandle) -> Router {
    Router::new().merge(system::routes()).with_state(app)
}
