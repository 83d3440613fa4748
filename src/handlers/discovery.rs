use crate::{handlers::AppState, models::PaymentRequiredBody, services::protocols};
use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

pub const ENTRYPOINT: &str = "yield-pool-watcher";
pub const INVOKE_PATH: &str = "/entrypoints/yield-pool-watcher/invoke";

const JSON_SCHEMA: &str = "https://json-schema.org/draft/2020-12/schema";

pub fn input_schema() -> Value {
    json!({
        "$schema": JSON_SCHEMA,
        "type": "object",
        "properties": {
            "protocolIds": {
                "type": "array",
                "items": {"type": "string"},
                "description": "DeFi protocols to monitor"
            },
            "pools": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Pool addresses to watch"
            },
            "chain": {
                "type": "integer",
                "description": "Target blockchain chain ID"
            },
            "thresholdRules": {
                "type": "array",
                "description": "Alert threshold configuration",
                "items": {
                    "type": "object",
                    "properties": {
                        "metric": {"type": "string", "enum": ["tvl_drop", "tvl_spike", "apy_spike", "apy_drop"]},
                        "thresholdPercent": {"type": "number", "exclusiveMinimum": 0},
                        "timeframeMinutes": {"type": "integer", "enum": [5, 15, 60]}
                    },
                    "required": ["metric", "thresholdPercent", "timeframeMinutes"]
                }
            }
        },
        "required": ["protocolIds", "pools", "chain"]
    })
}

pub fn output_schema() -> Value {
    json!({
        "$schema": JSON_SCHEMA,
        "type": "object",
        "description": "APY and TVL tracking with sharp change alerts",
        "properties": {
            "poolMetrics": {"type": "array"},
            "deltas": {"type": "array"},
            "alerts": {"type": "array"},
            "timestamp": {"type": "string", "format": "date-time"}
        },
        "required": ["poolMetrics", "deltas", "alerts"]
    })
}

/// 402 advertising the invoke price together with request/response schemas.
pub async fn entrypoint_discovery(State(state): State<AppState>) -> (StatusCode, Json<PaymentRequiredBody>) {
    let gate = &state.gate;
    let mut requirements = gate.requirements(
        gate.settings().resource_url(INVOKE_PATH),
        "Yield Pool Watcher - Monitor pool APY and TVL with threshold alerts",
    );
    requirements.input_schema = Some(input_schema());
    requirements.output_schema = Some(output_schema());

    (StatusCode::PAYMENT_REQUIRED, Json(PaymentRequiredBody::new(requirements)))
}

pub async fn x402_metadata(State(state): State<AppState>) -> (StatusCode, Json<PaymentRequiredBody>) {
    let gate = &state.gate;
    let requirements = gate.requirements(
        gate.settings().resource_url(INVOKE_PATH),
        "Monitor pool APY and TVL with configurable threshold alerts",
    );

    (StatusCode::PAYMENT_REQUIRED, Json(PaymentRequiredBody::new(requirements)))
}

pub async fn agent_card(State(state): State<AppState>) -> Json<Value> {
    let settings = state.gate.settings();
    let base_url = settings.base_url.trim_end_matches('/');

    Json(json!({
        "name": "Yield Pool Watcher",
        "description": format!(
            "Track APY and TVL across DeFi pools and alert on sharp changes. Monitor Uniswap, Aave, Curve, and more across {} chains.",
            protocols::SUPPORTED_CHAINS.len()
        ),
        "url": format!("{}/", base_url),
        "version": env!("CARGO_PKG_VERSION"),
        "capabilities": {
            "streaming": false,
            "pushNotifications": false,
            "stateTransitionHistory": true
        },
        "defaultInputModes": ["application/json"],
        "defaultOutputModes": ["application/json"],
        "skills": [{
            "id": ENTRYPOINT,
            "name": ENTRYPOINT,
            "description": "Monitor pool APY and TVL with configurable threshold alerts",
            "inputModes": ["application/json"],
            "outputModes": ["application/json"],
            "streaming": false,
            "x_input_schema": input_schema(),
            "x_output_schema": output_schema()
        }],
        "entrypoints": {
            ENTRYPOINT: {
                "description": "Track APY and TVL across DeFi pools with real-time alerts",
                "streaming": false,
                "input_schema": input_schema(),
                "output_schema": output_schema(),
                "pricing": {"invoke": settings.max_amount_required},
                "resource": settings.resource_url(INVOKE_PATH)
            }
        },
        "payments": [{
            "method": "x402",
            "payee": settings.pay_to,
            "network": settings.network,
            "asset": settings.asset,
            "priceModel": {"default": settings.max_amount_required}
        }]
    }))
}

/// Machine-readable service index.
pub async fn index(State(state): State<AppState>) -> Json<Value> {
    let settings = state.gate.settings();

    Json(json!({
        "service": "yield-pool-watcher",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Track APY and TVL across DeFi pools and alert on sharp changes",
        "freeMode": settings.free_mode,
        "protocols": protocols::supported_protocols(),
        "chains": protocols::SUPPORTED_CHAINS,
        "endpoints": {
            "health": "/health",
            "protocols": "/protocols",
            "watch": "/pools/watch",
            "invoke": INVOKE_PATH,
            "x402": "/.well-known/x402",
            "agent": "/.well-known/agent.json"
        }
    }))
}
