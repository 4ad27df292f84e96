//! Inbound HTTP surface
//!
//! - GET /barcode/_wait - block until the next barcode document changes
//! - GET /health        - liveness probe

use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::error::RelayResult;
use crate::relay::ChangeRelay;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<ChangeRelay>,
}

/// Create the HTTP router
pub fn create_router(relay: Arc<ChangeRelay>) -> Router {
    Router::new()
        .route("/barcode/_wait", get(wait_for_barcode))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { relay })
}

/// Listen for the next barcode event
async fn wait_for_barcode(State(state): State<AppState>) -> RelayResult<Json<Value>> {
    state.relay.wait_for_next_change().await.map(Json)
}

/// Basic health check (always returns OK if server is running)
async fn health_check() -> impl IntoResponse {
    "OK"
}
