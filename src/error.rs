use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PoolWatcherError {
    #[error("No RPC URL configured for chain {0}")]
    UnsupportedChain(u64),

    #[error("Failed to connect to RPC: {0}")]
    ChainUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Pool data error: {0}")]
    PoolData(String),

    #[error("RPC error: {0}")]
    Rpc(#[from] ethers::providers::ProviderError),

    #[error("Contract error: {0}")]
    Contract(#[from] ethers::contract::ContractError<ethers::providers::Provider<ethers::providers::Http>>),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl PoolWatcherError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            PoolWatcherError::UnsupportedChain(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UNSUPPORTED_CHAIN")
            }
            PoolWatcherError::ChainUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "CHAIN_UNAVAILABLE")
            }
            PoolWatcherError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            PoolWatcherError::UnsupportedProtocol(_) => {
                (StatusCode::BAD_REQUEST, "UNSUPPORTED_PROTOCOL")
            }
            PoolWatcherError::Rpc(_) | PoolWatcherError::Contract(_) => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR")
            }
            PoolWatcherError::PoolData(_) | PoolWatcherError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for PoolWatcherError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let (status, error_code) = self.status_and_code();

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id,
        };

        tracing::error!(
            error = ?self,
            error_code = error_code,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}
