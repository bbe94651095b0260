use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — liveness probe.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "protocol": conflux_core::config::PROTOCOL_VERSION,
        "ws_clients": state.ws_clients.len(),
    }))
}
