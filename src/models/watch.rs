use super::{Alert, Delta, PoolMetric};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-supplied alert rule. `metric` is kept as free text so that an
/// unknown rule type degrades to "no alerts" instead of a rejected body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdRule {
    pub metric: String,
    #[serde(alias = "threshold_percent")]
    pub threshold_percent: f64,
    #[serde(alias = "timeframe_minutes")]
    pub timeframe_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest {
    #[serde(alias = "protocol_ids")]
    pub protocol_ids: Vec<String>,
    pub pools: Vec<String>,
    pub chain: u64,
    #[serde(alias = "threshold_rules", default)]
    pub threshold_rules: Vec<ThresholdRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchResponse {
    pub pool_metrics: Vec<PoolMetric>,
    pub deltas: Vec<Delta>,
    pub alerts: Vec<Alert>,
    pub timestamp: DateTime<Utc>,
}
