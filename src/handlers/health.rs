use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;
use crate::types::CurrentSource;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub connected_clients: usize,
    pub uptime_seconds: u64,
}

/// Pipeline status response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub source: CurrentSource,
    pub title: String,
    pub producer_active: bool,
    pub connected_clients: usize,
}

/// Health check endpoint
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connected_clients: state.hub.session_count(),
        uptime_seconds: state.uptime_seconds(),
    };

    (StatusCode::OK, Json(response))
}

/// Current source endpoint
pub async fn pipeline_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let status = state.switch.status();
    Json(StatusResponse {
        source: status.current,
        title: status.title,
        producer_active: status.producer_active,
        connected_clients: state.hub.session_count(),
    })
}
