//! Axum Router Configuration
//!
//! This module defines the HTTP routing for the application: a health probe
//! and the WebSocket endpoint lessons run over.

use crate::{state::AppState, ws::ws_handler};

use axum::{Router, routing::get};
use std::sync::Arc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .with_state(app_state)
}

async fn health() -> &'static str {
    "ok"
}
