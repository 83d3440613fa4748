use crate::models::{PaymentRequiredBody, PaymentRequirements};
use crate::services::Facilitator;
use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

pub const PAYMENT_HEADER: &str = "X-Payment";

/// Paths that are never gated: discovery, health and docs.
const SKIP_PREFIXES: [&str; 5] = ["/health", "/.well-known", "/docs", "/redoc", "/openapi.json"];

#[derive(Debug, Clone)]
pub struct X402Settings {
    pub pay_to: String,
    pub asset: String,
    pub network: String,
    pub max_amount_required: String,
    pub base_url: String,
    pub max_timeout_seconds: u64,
    pub free_mode: bool,
}

impl X402Settings {
    pub fn resource_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    MissingHeader,
    InvalidHeader(String),
    VerificationFailed(String),
}

/// Terminal REJECTED state; renders as HTTP 402 with payment instructions.
#[derive(Debug, Clone)]
pub struct PaymentRejection {
    pub reason: RejectionReason,
    pub body: PaymentRequiredBody,
}

impl IntoResponse for PaymentRejection {
    fn into_response(self) -> Response {
        (StatusCode::PAYMENT_REQUIRED, Json(self.body)).into_response()
    }
}

/// Terminal ADMITTED state.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Free mode, or a path/method that is never gated.
    Unmetered,
    Verified {
        facilitator: String,
        payer: Option<String>,
    },
}

/// Request-level admission filter for paid invocations.
///
/// Facilitators are consulted in order with early exit on the first valid
/// result. Only when every facilitator fails is the request rejected, and
/// only the last failure is reported. Nothing is cached between requests.
pub struct PaymentGate {
    settings: X402Settings,
    facilitators: Vec<Arc<dyn Facilitator>>,
}

impl PaymentGate {
    pub fn new(settings: X402Settings, facilitators: Vec<Arc<dyn Facilitator>>) -> Self {
        tracing::info!(
            "x402 gate initialized (FREE_MODE={}, facilitators=[{}])",
            settings.free_mode,
            facilitators
                .iter()
                .map(|f| f.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Self {
            settings,
            facilitators,
        }
    }

    pub fn settings(&self) -> &X402Settings {
        &self.settings
    }

    pub fn requirements(&self, resource: String, description: &str) -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".to_string(),
            network: self.settings.network.clone(),
            max_amount_required: self.settings.max_amount_required.clone(),
            resource,
            description: description.to_string(),
            mime_type: "application/json".to_string(),
            pay_to: self.settings.pay_to.clone(),
            max_timeout_seconds: self.settings.max_timeout_seconds,
            asset: self.settings.asset.clone(),
            input_schema: None,
            output_schema: None,
        }
    }

    /// Whether a request must carry a verified payment.
    pub fn requires_payment(&self, method: &Method, path: &str) -> bool {
        if self.settings.free_mode {
            return false;
        }
        if path == "/" || SKIP_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
            return false;
        }

        *method == Method::POST && path.contains("/entrypoints/")
    }

    pub async fn admit(
        &self,
        method: &Method,
        path: &str,
        payment_header: Option<&str>,
    ) -> Result<Admission, PaymentRejection> {
        self.admit_header(method, path, payment_header.map(Ok)).await
    }

    /// Like `admit`, for a header that may be present but not readable as text.
    pub async fn admit_header(
        &self,
        method: &Method,
        path: &str,
        payment_header: Option<Result<&str, String>>,
    ) -> Result<Admission, PaymentRejection> {
        if !self.requires_payment(method, path) {
            return Ok(Admission::Unmetered);
        }

        let requirements = self.requirements(
            self.settings.resource_url(path),
            "Payment required to access this resource",
        );

        let Some(header) = payment_header else {
            tracing::info!("Payment required for {}, no X-Payment header provided", path);
            return Err(PaymentRejection {
                reason: RejectionReason::MissingHeader,
                body: PaymentRequiredBody::new(requirements),
            });
        };

        let payload = match header.and_then(decode_payment_header) {
            Ok(payload) => payload,
            Err(e) => {
                let message = format!("Invalid payment header format: {}", e);
                tracing::warn!("{}", message);
                return Err(Self::rejection(
                    RejectionReason::InvalidHeader(message),
                    requirements,
                ));
            }
        };

        let mut last_error = "No facilitators configured".to_string();
        for facilitator in &self.facilitators {
            match facilitator.verify(&payload, &requirements).await {
                Ok(result) if result.is_valid => {
                    tracing::info!(
                        "Payment verified via {} for payer: {}",
                        facilitator.name(),
                        result.payer.as_deref().unwrap_or("unknown")
                    );
                    return Ok(Admission::Verified {
                        facilitator: facilitator.name().to_string(),
                        payer: result.payer,
                    });
                }
                Ok(result) => {
                    let reason = result
                        .invalid_reason
                        .unwrap_or_else(|| "Unknown reason".to_string());
                    tracing::debug!("Payment invalid at {}: {}", facilitator.name(), reason);
                    last_error = reason;
                }
                Err(e) => {
                    tracing::debug!("Facilitator {} failed: {}", facilitator.name(), e);
                    last_error = e.to_string();
                }
            }
        }

        tracing::warn!(
            "Payment verification failed with all facilitators. Last error: {}",
            last_error
        );
        Err(Self::rejection(
            RejectionReason::VerificationFailed(last_error),
            requirements,
        ))
    }

    fn rejection(reason: RejectionReason, requirements: PaymentRequirements) -> PaymentRejection {
        let (error, message) = match &reason {
            RejectionReason::MissingHeader => (None, None),
            RejectionReason::InvalidHeader(message) => {
                (Some("Invalid payment header".to_string()), Some(message.clone()))
            }
            RejectionReason::VerificationFailed(message) => (
                Some("Payment verification failed".to_string()),
                Some(message.clone()),
            ),
        };

        let mut body = PaymentRequiredBody::new(requirements);
        body.error = error;
        body.message = message;

        PaymentRejection { reason, body }
    }
}

/// Decodes the base64 JSON payload carried in `X-Payment`.
pub fn decode_payment_header(header: &str) -> Result<serde_json::Value, String> {
    let bytes = STANDARD
        .decode(header.trim())
        .map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}

// Axum middleware function
pub async fn x402_middleware_layer(
    gate: Arc<PaymentGate>,
    request: Request,
    next: Next,
) -> Result<Response, PaymentRejection> {
    let payment_header = request
        .headers()
        .get(PAYMENT_HEADER)
        .map(|h| h.to_str().map_err(|e| e.to_string()));

    let admission = gate
        .admit_header(request.method(), request.uri().path(), payment_header)
        .await?;

    if let Admission::Verified { facilitator, .. } = &admission {
        tracing::info!(
            "Payment verified by {}, processing request to {}",
            facilitator,
            request.uri().path()
        );
    }

    Ok(next.run(request).await)
}
