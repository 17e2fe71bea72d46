//! HTTP route handlers for the fan controller.
//!
//! The Control API lives under `/api/`; every other `GET` is served from the
//! web root by [`assets::serve`].

pub mod assets;
pub mod device;
pub mod fan;
pub mod wifi;

use crate::AppState;
use axum::{routing::get, Router};

/// Create the main Axum router with all routes.
///
/// Routes are organized as:
/// - `/api/rpm`, `/api/fan` - Speed sensor and actuator
/// - `/api/wifi`, `/api/mode` - Connectivity
/// - `/api/name` - Device name
/// - `/*` - Static web UI files
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .fallback(get(assets::serve))
        .with_state(state)
}

/// Create /api routes.
fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(fan::routes())
        .merge(wifi::routes())
        .merge(device::routes())
}
