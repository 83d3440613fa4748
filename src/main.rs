use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use yield_pool_watcher::{
    app,
    config::Config,
    handlers::AppState,
    middleware::PaymentGate,
    services::*,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting Yield Pool Watcher v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    // Initialize services
    let cache = Arc::new(CacheService::new(config.redis_url.as_deref()).await?);
    let prices = Arc::new(PriceService::new(config.coingecko_api_url.clone(), cache.clone())?);
    let chain = Arc::new(ChainService::new(
        &config.rpc_urls,
        prices,
        cache.clone(),
        config.apy_sample_blocks,
    )?);

    let watcher = Arc::new(WatchService::new(
        chain,
        DeltaEngine::new(Arc::new(SnapshotStore::default())),
        AlertEngine::default(),
    ));

    // Initialize x402 gate, facilitators tried in configured order
    let mut facilitators: Vec<Arc<dyn Facilitator>> = Vec::new();
    for url in &config.facilitator_urls {
        facilitators.push(Arc::new(HttpFacilitator::new(url.clone(), config.facilitator_timeout)?));
    }
    let gate = Arc::new(PaymentGate::new(config.x402_settings(), facilitators));

    let app_state = AppState {
        watcher,
        gate,
        cache,
        started_at: Instant::now(),
    };

    // Build router
    let app = app(app_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        return;
    }
    tracing::info!("Shutting down gracefully...");
}
