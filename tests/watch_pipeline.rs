
use axum::{
    body::{to_bytes, Body},
    http::{HeaderValue, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio_test::{assert_err, assert_ok};
use tower::ServiceExt;

use mock_source::MockSource;
use yield_pool_watcher::{
    app,
    error::PoolWatcherError,
    handlers::AppState,
    middleware::{PaymentGate, X402Settings},
    models::{BaseMetric, Severity, ThresholdRule, WatchRequest},
    services::{AlertEngine, CacheService, DeltaEngine, SnapshotStore, WatchService},
};

const POOL: &str = "0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc";
const INVOKE: &str = "/entrypoints/yield-pool-watcher/invoke";

struct Harness {
    source: MockSource,
    store: Arc<SnapshotStore>,
    watcher: Arc<WatchService>,
}

fn harness() -> Harness {
    let source = MockSource::new(vec![1]);
    let store = Arc::new(SnapshotStore::default());
    let watcher = Arc::new(WatchService::new(
        Arc::new(source.clone()),
        DeltaEngine::new(store.clone()),
        AlertEngine::default(),
    ));
    Harness {
        source,
        store,
        watcher,
    }
}

fn router(watcher: Arc<WatchService>, free_mode: bool) -> Router {
    let settings = X402Settings {
        pay_to: "0x01D11F7e1a46AbFC6092d7be484895D2d505095c".to_string(),
        asset: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string(),
        network: "base".to_string(),
        max_amount_required: "50000".to_string(),
        base_url: "http://localhost:8000".to_string(),
        max_timeout_seconds: 30,
        free_mode,
    };

    app(AppState {
        watcher,
        gate: Arc::new(PaymentGate::new(settings, vec![])),
        cache: Arc::new(CacheService::memory_only()),
        started_at: Instant::now(),
    })
}

fn watch_request(chain: u64, threshold: f64) -> WatchRequest {
    WatchRequest {
        protocol_ids: vec!["uniswap-v2".to_string()],
        pools: vec![POOL.to_string()],
        chain,
        threshold_rules: vec![ThresholdRule {
            metric: "tvl_drop".to_string(),
            threshold_percent: threshold,
            timeframe_minutes: 60,
        }],
    }
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// -----------------------
// Pipeline
// -----------------------

#[tokio::test]
async fn sixty_percent_tvl_drop_raises_high_alert() {
    let h = harness();
    h.store.record(POOL, 1_000_000.0, 5.0, Utc::now() - Duration::minutes(60));
    h.source.set_pool(POOL, "uniswap-v2", 400_000.0, 5.0).await;

    let response = assert_ok!(h.watcher.watch(&watch_request(1, 20.0)).await);

    assert_eq!(response.pool_metrics.len(), 1);
    let tvl_delta = response
        .deltas
        .iter()
        .find(|d| d.metric == BaseMetric::Tvl && d.timeframe_minutes == 60)
        .expect("60 minute tvl delta");
    assert!((tvl_delta.change_percent + 60.0).abs() < 1e-9);
    assert_eq!(tvl_delta.pool_id, POOL);

    assert_eq!(response.alerts.len(), 1);
    let alert = &response.alerts[0];
    assert_eq!(alert.severity, Severity::High);
    assert_eq!(alert.protocol, "uniswap-v2");
    assert_eq!(alert.alert_type, "tvl_drop");
    assert_eq!(alert.threshold_percent, 20.0);
}

#[tokio::test]
async fn duplicate_pool_ids_are_observed_once() {
    let h = harness();
    h.store.record(POOL, 1_000_000.0, 5.0, Utc::now() - Duration::minutes(60));
    h.source.set_pool(POOL, "uniswap-v2", 400_000.0, 5.0).await;

    let mut request = watch_request(1, 20.0);
    request.pools = vec![POOL.to_string(), POOL.to_string()];
    let response = assert_ok!(h.watcher.watch(&request).await);

    assert_eq!(h.store.len(POOL), 2);
    assert_eq!(response.pool_metrics.len(), 1);
    for metric in [BaseMetric::Tvl, BaseMetric::Apy] {
        let hourly = response
            .deltas
            .iter()
            .filter(|d| d.metric == metric && d.timeframe_minutes == 60)
            .count();
        assert_eq!(hourly, 1);
    }
    assert_eq!(response.alerts.len(), 1);
}

#[tokio::test]
async fn first_observation_yields_no_deltas() {
    let h = harness();
    h.source.set_pool(POOL, "uniswap-v2", 1_000_000.0, 5.0).await;

    let response = assert_ok!(h.watcher.watch(&watch_request(1, 20.0)).await);

    assert_eq!(response.pool_metrics.len(), 1);
    assert!(response.deltas.is_empty());
    assert!(response.alerts.is_empty());
    assert_eq!(h.store.len(POOL), 1);
}

#[tokio::test]
async fn stale_history_does_not_answer_short_windows() {
    let h = harness();
    h.store.record(POOL, 1_000_000.0, 5.0, Utc::now() - Duration::hours(2));
    h.source.set_pool(POOL, "uniswap-v2", 100.0, 5.0).await;

    let response = assert_ok!(h.watcher.watch(&watch_request(1, 20.0)).await);
    assert!(response.deltas.is_empty());
    assert!(response.alerts.is_empty());
}

#[tokio::test]
async fn unsupported_chain_fails_the_request() {
    let h = harness();
    let err = assert_err!(h.watcher.watch(&watch_request(137, 20.0)).await);
    assert!(matches!(err, PoolWatcherError::UnsupportedChain(137)));
}

// -----------------------
// Router
// -----------------------

#[tokio::test]
async fn health_reports_protocols_and_mode() {
    let h = harness();
    let (status, body) = send(router(h.watcher, false), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["supportedProtocols"], 7);
    assert_eq!(body["freeMode"], false);
}

#[tokio::test]
async fn protocols_are_listed() {
    let h = harness();
    let (status, body) = send(router(h.watcher, false), get("/protocols")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 7);
    assert_eq!(body["protocols"][0]["id"], "uniswap-v2");
}

#[tokio::test]
async fn watch_on_unconfigured_chain_is_503() {
    let h = harness();
    let request = post_json("/pools/watch", serde_json::to_value(watch_request(137, 20.0)).unwrap());
    let (status, body) = send(router(h.watcher, false), request).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["errorCode"], "UNSUPPORTED_CHAIN");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn non_positive_threshold_is_400() {
    let h = harness();
    let request = post_json("/pools/watch", serde_json::to_value(watch_request(1, 0.0)).unwrap());
    let (status, body) = send(router(h.watcher, false), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], "INVALID_REQUEST");
}

#[tokio::test]
async fn watch_accepts_snake_case_bodies() {
    let h = harness();
    h.source.set_pool(POOL, "uniswap-v2", 1_000.0, 3.0).await;
    let request = post_json(
        "/pools/watch",
        json!({
            "protocol_ids": ["uniswap-v2"],
            "pools": [POOL],
            "chain": 1,
            "threshold_rules": [{"metric": "tvl_drop", "threshold_percent": 10, "timeframe_minutes": 5}]
        }),
    );
    let (status, body) = send(router(h.watcher, false), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["poolMetrics"][0]["poolId"], POOL);
    assert_eq!(body["alerts"], json!([]));
}

#[tokio::test]
async fn unpaid_invoke_is_402_with_instructions() {
    let h = harness();
    let request = post_json(INVOKE, serde_json::to_value(watch_request(1, 20.0)).unwrap());
    let (status, body) = send(router(h.watcher, false), request).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["x402Version"], 1);
    assert_eq!(body["accepts"][0]["payTo"], "0x01D11F7e1a46AbFC6092d7be484895D2d505095c");
    assert_eq!(body["accepts"][0]["maxAmountRequired"], "50000");
    assert_eq!(h.store.pool_count(), 0);
}

#[tokio::test]
async fn non_text_payment_header_is_invalid_not_missing() {
    let h = harness();
    let mut request = post_json(INVOKE, serde_json::to_value(watch_request(1, 20.0)).unwrap());
    request
        .headers_mut()
        .insert("X-Payment", HeaderValue::from_bytes(&[0xff, 0xfe, 0x41]).unwrap());
    let (status, body) = send(router(h.watcher, false), request).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "Invalid payment header");
    assert!(body["message"]
        .as_str()
        .unwrap_or_default()
        .starts_with("Invalid payment header format"));
    assert_eq!(h.store.pool_count(), 0);
}

#[tokio::test]
async fn free_mode_invoke_runs_the_pipeline() {
    let h = harness();
    h.source.set_pool(POOL, "uniswap-v2", 1_000.0, 3.0).await;
    let request = post_json(INVOKE, serde_json::to_value(watch_request(1, 20.0)).unwrap());
    let (status, body) = send(router(h.watcher, true), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["poolMetrics"][0]["protocolId"], "uniswap-v2");
    assert_eq!(h.store.len(POOL), 1);
}

#[tokio::test]
async fn free_mode_invoke_without_body_returns_discovery() {
    let h = harness();
    let request = Request::builder()
        .method("POST")
        .uri(INVOKE)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(router(h.watcher, true), request).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert!(body["accepts"][0]["inputSchema"].is_object());
}

#[tokio::test]
async fn discovery_endpoints() {
    let h = harness();
    let app = router(h.watcher, false);

    let (status, body) = send(app.clone(), get(INVOKE)).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(
        body["accepts"][0]["resource"],
        "http://localhost:8000/entrypoints/yield-pool-watcher/invoke"
    );
    assert!(body["accepts"][0]["outputSchema"].is_object());

    let head = Request::builder().method("HEAD").uri(INVOKE).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(head).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    let (status, body) = send(app.clone(), get("/.well-known/x402")).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["accepts"][0]["asset"], "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

    let (status, body) = send(app.clone(), get("/.well-known/agent.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payments"][0]["method"], "x402");

    let (status, body) = send(app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoints"]["invoke"], INVOKE);
}
