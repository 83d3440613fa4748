use crate::{
    error::PoolWatcherError,
    handlers::discovery::entrypoint_discovery,
    middleware::PaymentGate,
    models::{WatchRequest, WatchResponse},
    services::{CacheService, WatchService},
};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub watcher: Arc<WatchService>,
    pub gate: Arc<PaymentGate>,
    pub cache: Arc<CacheService>,
    pub started_at: Instant,
}

pub async fn watch_pools(
    State(state): State<AppState>,
    Json(request): Json<WatchRequest>,
) -> Result<Json<WatchResponse>, PoolWatcherError> {
    let response = state.watcher.watch(&request).await?;
    Ok(Json(response))
}

/// Paid alias of `/pools/watch`. The gate has already admitted the request;
/// a missing or unreadable body gets the discovery response instead.
pub async fn invoke_watch(
    State(state): State<AppState>,
    request: Option<Json<WatchRequest>>,
) -> Response {
    let Some(Json(request)) = request else {
        return entrypoint_discovery(State(state)).await.into_response();
    };

    match state.watcher.watch(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}
