use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current state of a pool as reported by the data layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolMetric {
    pub pool_id: String,
    pub protocol_id: String,
    pub apy: f64,
    pub tvl_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supply_apy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub borrow_apy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fees_24h: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_24h: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PoolMetric {
    pub fn new(pool_id: impl Into<String>, protocol_id: impl Into<String>, apy: f64, tvl_usd: f64) -> Self {
        Self {
            pool_id: pool_id.into(),
            protocol_id: protocol_id.into(),
            apy,
            tvl_usd,
            supply_apy: None,
            borrow_apy: None,
            fees_24h: None,
            volume_24h: None,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BaseMetric {
    Tvl,
    Apy,
}

impl fmt::Display for BaseMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseMetric::Tvl => f.write_str("tvl"),
            BaseMetric::Apy => f.write_str("apy"),
        }
    }
}

/// Percentage change of one metric of one pool against a lookback window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    pub pool_id: String,
    pub metric: BaseMetric,
    pub previous_value: f64,
    pub current_value: f64,
    pub change_percent: f64,
    pub timeframe_minutes: u32,
}

impl Delta {
    /// Returns `None` when `previous` is not strictly positive.
    pub fn between(
        pool_id: &str,
        metric: BaseMetric,
        previous: f64,
        current: f64,
        timeframe_minutes: u32,
    ) -> Option<Self> {
        if previous.is_nan() || previous <= 0.0 {
            return None;
        }

        Some(Self {
            pool_id: pool_id.to_string(),
            metric,
            previous_value: previous,
            current_value: current,
            change_percent: (current - previous) / previous * 100.0,
            timeframe_minutes,
        })
    }
}
