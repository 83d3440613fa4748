use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// One sample of a pool's state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub tvl: f64,
    pub apy: f64,
}

type History = Arc<Mutex<VecDeque<Observation>>>;

/// Bounded, memory-resident history of observations per pool.
///
/// Guarantees:
/// - Each pool's history is insertion ordered.
/// - After `record`, every retained observation is within `retention`
///   of the `now` passed to that call.
/// - Appends to different pools never contend on the same lock; the outer
///   map is only write-locked when a pool is seen for the first time.
pub struct SnapshotStore {
    retention: Duration,
    histories: RwLock<HashMap<String, History>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

impl SnapshotStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            histories: RwLock::new(HashMap::new()),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    fn history(&self, pool_id: &str) -> Option<History> {
        self.histories.read().get(pool_id).cloned()
    }

    fn history_or_insert(&self, pool_id: &str) -> History {
        if let Some(history) = self.history(pool_id) {
            return history;
        }

        self.histories
            .write()
            .entry(pool_id.to_string())
            .or_default()
            .clone()
    }

    /// Appends an observation and evicts everything older than the
    /// retention window relative to `now`.
    pub fn record(&self, pool_id: &str, tvl: f64, apy: f64, now: DateTime<Utc>) {
        let history = self.history_or_insert(pool_id);
        let mut history = history.lock();

        history.push_back(Observation {
            timestamp: now,
            tvl,
            apy,
        });

        let cutoff = now - self.retention;
        let before = history.len();
        history.retain(|obs| obs.timestamp > cutoff);

        let evicted = before - history.len();
        if evicted > 0 {
            tracing::debug!(pool_id, evicted, "evicted expired observations");
        }
    }

    /// Observation closest in time to `target`; the earliest one wins a tie.
    pub fn closest(&self, pool_id: &str, target: DateTime<Utc>) -> Option<Observation> {
        let history = self.history(pool_id)?;
        let history = history.lock();

        let mut best: Option<(Duration, Observation)> = None;
        for obs in history.iter() {
            let distance = if obs.timestamp >= target {
                obs.timestamp - target
            } else {
                target - obs.timestamp
            };
            match best {
                Some((best_distance, _)) if distance >= best_distance => {}
                _ => best = Some((distance, *obs)),
            }
        }

        best.map(|(_, obs)| obs)
    }

    pub fn len(&self, pool_id: &str) -> usize {
        self.history(pool_id).map(|h| h.lock().len()).unwrap_or(0)
    }

    pub fn is_empty(&self, pool_id: &str) -> bool {
        self.len(pool_id) == 0
    }

    pub fn pool_count(&self) -> usize {
        self.histories.read().len()
    }
}
