//! # fanctl-web
//!
//! HTTP surface of the fan controller.
//!
//! This crate provides:
//! - The Control API endpoints under `/api/`
//! - Static file serving for the web UI from a directory on disk
//!
//! All handler logic lives in [`fanctl_core::ControlApi`]; this crate only
//! adapts it to axum.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fanctl_web::{create_router, WebState};
//!
//! let state = WebState::new(api, config.web_root.clone());
//! let app = create_router(state);
//!
//! let listener = TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod routes;

// Re-exports
pub use error::WebError;
pub use routes::create_router;

use std::path::PathBuf;
use std::sync::Arc;

use fanctl_core::ControlApi;

/// Shared state for all route handlers.
pub struct WebState {
    pub api: ControlApi,
    /// Directory the static asset endpoint serves from.
    pub web_root: PathBuf,
}

impl WebState {
    pub fn new(api: ControlApi, web_root: impl Into<PathBuf>) -> AppState {
        Arc::new(Self {
            api,
            web_root: web_root.into(),
        })
    }
}

/// Type alias for shared state in Axum handlers.
pub type AppState = Arc<WebState>;
