use crate::models::{BaseMetric, Delta};
use crate::services::SnapshotStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Lookback windows, in minutes, that deltas are computed against.
pub const LOOKBACK_WINDOWS_MINUTES: [u32; 3] = [5, 15, 60];

pub fn is_supported_window(minutes: u32) -> bool {
    LOOKBACK_WINDOWS_MINUTES.contains(&minutes)
}

/// Records observations and compares them against the pool's history.
///
/// A historical sample only answers a window's query when it lies strictly
/// within half a window of `now - window`, so a two-hour-old sample never
/// stands in for "five minutes ago".
pub struct DeltaEngine {
    store: Arc<SnapshotStore>,
    windows: Vec<u32>,
}

impl DeltaEngine {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self {
            store,
            windows: LOOKBACK_WINDOWS_MINUTES.to_vec(),
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn compute_deltas(
        &self,
        pool_id: &str,
        current_tvl: f64,
        current_apy: f64,
        now: DateTime<Utc>,
    ) -> Vec<Delta> {
        self.store.record(pool_id, current_tvl, current_apy, now);

        let mut deltas = Vec::new();
        if self.store.len(pool_id) < 2 {
            return deltas;
        }

        for &window in &self.windows {
            let span = Duration::minutes(window as i64);
            let target = now - span;

            let Some(previous) = self.store.closest(pool_id, target) else {
                continue;
            };

            let distance = if previous.timestamp >= target {
                previous.timestamp - target
            } else {
                target - previous.timestamp
            };
            // distance * 2 < window avoids rounding half of an odd window
            if distance * 2 >= span {
                continue;
            }

            deltas.extend(Delta::between(
                pool_id,
                BaseMetric::Tvl,
                previous.tvl,
                current_tvl,
                window,
            ));
            deltas.extend(Delta::between(
                pool_id,
                BaseMetric::Apy,
                previous.apy,
                current_apy,
                window,
            ));
        }

        if !deltas.is_empty() {
            tracing::debug!(pool_id, count = deltas.len(), "computed deltas");
        }

        deltas
    }
}
