// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the relay.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::RelayState;

/// Build the main `Router`: trigger, health, and WebSocket upgrades on any
/// other path.
pub fn build_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/health", get(http::health))
        .route("/trigger", post(http::trigger))
        .fallback(ws::ws_handler)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Build the router for a dedicated WebSocket port: upgrades only.
pub fn build_ws_router(state: Arc<RelayState>) -> Router {
    Router::new().fallback(ws::ws_handler).with_state(state)
}
