use crate::error::PoolWatcherError;
use crate::models::{PoolMetric, WatchRequest, WatchResponse};
use crate::services::{AlertEngine, DeltaEngine, PoolDataSource};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

/// Runs one watch request: fetch current metrics, fold them into history,
/// then evaluate every threshold rule against the resulting deltas.
pub struct WatchService {
    source: Arc<dyn PoolDataSource>,
    deltas: DeltaEngine,
    alerts: AlertEngine,
}

impl WatchService {
    pub fn new(source: Arc<dyn PoolDataSource>, deltas: DeltaEngine, alerts: AlertEngine) -> Self {
        Self {
            source,
            deltas,
            alerts,
        }
    }

    pub fn source(&self) -> &Arc<dyn PoolDataSource> {
        &self.source
    }

    pub fn delta_engine(&self) -> &DeltaEngine {
        &self.deltas
    }

    pub async fn watch(&self, request: &WatchRequest) -> Result<WatchResponse, PoolWatcherError> {
        tracing::info!(
            "Watch request: protocols={:?}, pools={:?}, chain={}",
            request.protocol_ids,
            request.pools,
            request.chain
        );

        validate(request)?;
        self.source.ensure_chain(request.chain).await?;

        // a pool named twice is still observed once
        let mut seen = HashSet::new();
        let pools = request.pools.iter().filter(|pool| seen.insert(pool.as_str()));

        let resolved = join_all(
            pools.map(|pool| self.resolve_pool(request.chain, pool, &request.protocol_ids)),
        )
        .await;
        let pool_metrics: Vec<PoolMetric> = resolved.into_iter().flatten().collect();

        let now = Utc::now();
        let deltas: Vec<_> = pool_metrics
            .iter()
            .flat_map(|m| self.deltas.compute_deltas(&m.pool_id, m.tvl_usd, m.apy, now))
            .collect();

        let alerts: Vec<_> = request
            .threshold_rules
            .iter()
            .flat_map(|rule| self.alerts.evaluate_at(&pool_metrics, &deltas, rule, now))
            .collect();

        tracing::info!(
            pools = pool_metrics.len(),
            deltas = deltas.len(),
            alerts = alerts.len(),
            "Watch request complete"
        );

        Ok(WatchResponse {
            pool_metrics,
            deltas,
            alerts,
            timestamp: now,
        })
    }

    /// First protocol that can read the pool wins; failures are logged and skipped.
    async fn resolve_pool(&self, chain: u64, pool: &str, protocol_ids: &[String]) -> Option<PoolMetric> {
        for protocol_id in protocol_ids {
            match self.source.pool_metrics(chain, pool, protocol_id).await {
                Ok(metric) => return Some(metric),
                Err(e) => {
                    tracing::warn!("Error getting metrics for pool {} on {}: {}", pool, protocol_id, e)
                }
            }
        }
        None
    }
}

fn validate(request: &WatchRequest) -> Result<(), PoolWatcherError> {
    for rule in &request.threshold_rules {
        if !rule.threshold_percent.is_finite() || rule.threshold_percent <= 0.0 {
            return Err(PoolWatcherError::InvalidRequest(format!(
                "thresholdPercent must be a positive number, got {} for {}",
                rule.threshold_percent, rule.metric
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThresholdRule;
    use crate::services::SnapshotStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Serves scripted values per pool; `uniswap-v2` is the only readable protocol.
    #[derive(Default)]
    struct ScriptedSource {
        tvl: Mutex<HashMap<String, f64>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl PoolDataSource for ScriptedSource {
        async fn ensure_chain(&self, chain: u64) -> Result<(), PoolWatcherError> {
            if chain == 1 {
                Ok(())
            } else {
                Err(PoolWatcherError::UnsupportedChain(chain))
            }
        }

        async fn pool_metrics(
            &self,
            _chain: u64,
            pool: &str,
            protocol_id: &str,
        ) -> Result<PoolMetric, PoolWatcherError> {
            self.calls.lock().push((pool.to_string(), protocol_id.to_string()));
            if protocol_id != "uniswap-v2" {
                return Err(PoolWatcherError::PoolData("not a pair".to_string()));
            }
            let tvl = self.tvl.lock().get(pool).copied().unwrap_or(1_000.0);
            Ok(PoolMetric::new(pool, protocol_id, 5.0, tvl))
        }

        fn configured_chains(&self) -> Vec<u64> {
            vec![1]
        }
    }

    fn service(source: Arc<ScriptedSource>) -> WatchService {
        WatchService::new(
            source,
            DeltaEngine::new(Arc::new(SnapshotStore::default())),
            AlertEngine::default(),
        )
    }

    fn request(chain: u64, threshold: f64) -> WatchRequest {
        WatchRequest {
            protocol_ids: vec!["curve".to_string(), "uniswap-v2".to_string()],
            pools: vec!["0xpool".to_string()],
            chain,
            threshold_rules: vec![ThresholdRule {
                metric: "tvl_drop".to_string(),
                threshold_percent: threshold,
                timeframe_minutes: 60,
            }],
        }
    }

    #[tokio::test]
    async fn unsupported_chain_is_an_error() {
        let watcher = service(Arc::new(ScriptedSource::default()));
        let err = watcher.watch(&request(137, 10.0)).await.unwrap_err();
        assert!(matches!(err, PoolWatcherError::UnsupportedChain(137)));
    }

    #[tokio::test]
    async fn non_positive_threshold_is_rejected_before_fetching() {
        let source = Arc::new(ScriptedSource::default());
        let watcher = service(source.clone());

        for threshold in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = watcher.watch(&request(1, threshold)).await.unwrap_err();
            assert!(matches!(err, PoolWatcherError::InvalidRequest(_)));
        }
        assert!(source.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn first_readable_protocol_wins() {
        let source = Arc::new(ScriptedSource::default());
        let watcher = service(source.clone());

        let response = watcher.watch(&request(1, 10.0)).await.unwrap();

        assert_eq!(response.pool_metrics.len(), 1);
        assert_eq!(response.pool_metrics[0].protocol_id, "uniswap-v2");
        assert_eq!(source.calls.lock().len(), 2);
        assert_eq!(watcher.delta_engine().store().len("0xpool"), 1);
        assert!(response.deltas.is_empty());
        assert!(response.alerts.is_empty());
    }

    #[tokio::test]
    async fn repeated_pool_is_fetched_once() {
        let source = Arc::new(ScriptedSource::default());
        let watcher = service(source.clone());
        let mut req = request(1, 10.0);
        req.protocol_ids = vec!["uniswap-v2".to_string()];
        req.pools = vec!["0xpool".to_string(), "0xother".to_string(), "0xpool".to_string()];

        let response = watcher.watch(&req).await.unwrap();

        let ids: Vec<_> = response.pool_metrics.iter().map(|m| m.pool_id.as_str()).collect();
        assert_eq!(ids, vec!["0xpool", "0xother"]);
        assert_eq!(source.calls.lock().len(), 2);
        assert_eq!(watcher.delta_engine().store().len("0xpool"), 1);
    }

    #[tokio::test]
    async fn unreadable_pools_are_skipped() {
        let watcher = service(Arc::new(ScriptedSource::default()));
        let mut req = request(1, 10.0);
        req.protocol_ids = vec!["aave".to_string()];

        let response = watcher.watch(&req).await.unwrap();
        assert!(response.pool_metrics.is_empty());
        assert!(response.deltas.is_empty());
    }
}
