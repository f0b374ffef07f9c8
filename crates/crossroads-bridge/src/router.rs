//! Axum router construction for the bridge.
//!
//! Assembles the `WebSocket` and REST routes into a single [`Router`]
//! with CORS enabled, since dashboards are served from another origin.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::BridgeState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /` and `GET /ws` -- dashboard `WebSocket`
/// - `GET /peer` -- peer relay `WebSocket`
/// - `GET /api/status` -- device presence and relay counters
///
/// Unmatched paths are served from `static_dir` when given, otherwise
/// answered with a JSON 404.
pub fn build_router(state: Arc<BridgeState>, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        // WebSocket
        .route("/", get(ws::ws_bridge))
        .route("/ws", get(ws::ws_bridge))
        .route("/peer", get(ws::ws_peer))
        // REST API
        .route("/api/status", get(handlers::status));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.fallback(handlers::not_found),
    };

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
