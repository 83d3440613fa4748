use crate::error::PoolWatcherError;
use crate::models::PoolMetric;
use async_trait::async_trait;

/// Resolves a pool to its current metrics on a given chain.
#[async_trait]
pub trait PoolDataSource: Send + Sync {
    /// Fails with `UnsupportedChain` when no endpoint is configured and
    /// `ChainUnavailable` when the endpoint cannot be reached.
    async fn ensure_chain(&self, chain: u64) -> Result<(), PoolWatcherError>;

    async fn pool_metrics(
        &self,
        chain: u64,
        pool: &str,
        protocol_id: &str,
    ) -> Result<PoolMetric, PoolWatcherError>;

    fn configured_chains(&self) -> Vec<u64>;
}
