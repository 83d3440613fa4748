use crate::models::{PaymentRequirements, VerifyRequest, VerifyResponse};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FacilitatorError {
    #[error("Facilitator unavailable: {0}")]
    Unavailable(String),

    #[error("Payment verification failed: {0}")]
    Rejected(String),

    #[error("Verification error: {0}")]
    Malformed(String),
}

/// A remote service that checks a payment proof against the chain.
/// Implementations must not retry; the gate owns the fallback order.
#[async_trait]
pub trait Facilitator: Send + Sync {
    fn name(&self) -> &str;

    async fn verify(
        &self,
        payload: &serde_json::Value,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, FacilitatorError>;
}

/// Facilitator reached over HTTP at `{url}/verify`.
pub struct HttpFacilitator {
    url: String,
    name: String,
    client: reqwest::Client,
}

impl HttpFacilitator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FacilitatorError> {
        let url = url.into().trim_end_matches('/').to_string();
        let name = reqwest::Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.clone());

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FacilitatorError::Unavailable(e.to_string()))?;

        Ok(Self { url, name, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Facilitator for HttpFacilitator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn verify(
        &self,
        payload: &serde_json::Value,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, FacilitatorError> {
        let request = VerifyRequest {
            payment_payload: payload,
            payment_requirements: requirements,
        };

        let response = self
            .client
            .post(format!("{}/verify", self.url))
            .json(&request)
            .send()
            .await
            .map_err(|e| FacilitatorError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("Facilitator {} returned {}: {}", self.name, status, body);
            return Err(FacilitatorError::Rejected(body));
        }

        response
            .json::<VerifyResponse>()
            .await
            .map_err(|e| FacilitatorError::Malformed(e.to_string()))
    }
}
