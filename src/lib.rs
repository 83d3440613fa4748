pub mod config;
pub mod contracts;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use handlers::*;
use middleware::x402_middleware_layer;

/// Builds the full router. The x402 gate wraps every route and decides
/// per request whether payment is needed.
pub fn app(state: AppState) -> Router {
    let gate = state.gate.clone();

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/protocols", get(list_protocols))
        .route("/pools/watch", post(watch_pools))
        .route(INVOKE_PATH, get(entrypoint_discovery).post(invoke_watch))
        .route("/.well-known/x402", get(x402_metadata))
        .route("/.well-known/agent.json", get(agent_card))
        .layer(axum_middleware::from_fn(move |req, next| {
            let gate = gate.clone();
            async move { x402_middleware_layer(gate, req, next).await }
        }))
        .with_state(state)
}
