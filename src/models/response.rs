use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub supported_protocols: usize,
    pub protocols: Vec<String>,
    pub free_mode: bool,
    pub redis: bool,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ProtocolList {
    pub protocols: Vec<ProtocolSummary>,
    pub total: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSummary {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub chains: Vec<u64>,
}
