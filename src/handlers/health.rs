use crate::{
    handlers::AppState,
    models::{HealthStatus, ProtocolList},
    services::protocols,
};
use axum::{extract::State, Json};
use chrono::Utc;

pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let protocols = protocols::supported_protocols();

    Json(HealthStatus {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        supported_protocols: protocols.len(),
        protocols: protocols.into_iter().map(str::to_string).collect(),
        free_mode: state.gate.settings().free_mode,
        redis: state.cache.ping().await,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
    })
}

pub async fn list_protocols() -> Json<ProtocolList> {
    let protocols = protocols::summaries();
    Json(ProtocolList {
        total: protocols.len(),
        protocols,
    })
}
