//! Axum Router Configuration
//!
//! The service surface is deliberately small: the realtime relay socket and
//! a health probe. Everything else the browser needs is static UI served
//! elsewhere.

use crate::state::AppState;
use crate::ws::ws_handler;
use axum::{Router, routing::get};
use std::sync::Arc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/realtime", get(ws_handler))
        .route("/healthz", get(healthz))
        .with_state(app_state)
}

async fn healthz() -> &'static str {
    "ok"
}
