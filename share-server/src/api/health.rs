//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use libsharecast::PlatformKind;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Platforms with configured clients
    pub platforms: Vec<PlatformKind>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    let platforms = state
        .dispatcher
        .platform_kinds()
        .into_iter()
        .filter(|kind| {
            state
                .dispatcher
                .platform(*kind)
                .is_some_and(|platform| platform.is_configured())
        })
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        service: "share-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        platforms,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
