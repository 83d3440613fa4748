use crate::middleware::X402Settings;
use crate::services::protocols;
use anyhow::{bail, Context, Result};
use ethers::types::Address;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PAYMENT_ADDRESS: &str = "0x01D11F7e1a46AbFC6092d7be484895D2d505095c";
const DEFAULT_PAYMENT_ASSET: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"; // USDC on Base
const DEFAULT_FACILITATORS: &str =
    "https://facilitator.daydreams.systems,https://api.cdp.coinbase.com/platform/v2/x402/facilitator";

/// Env var and public default per supported chain.
const RPC_ENDPOINTS: [(u64, &str, &str); 7] = [
    (protocols::ETHEREUM, "ETHEREUM_RPC_URL", "https://eth.llamarpc.com"),
    (protocols::POLYGON, "POLYGON_RPC_URL", "https://polygon.llamarpc.com"),
    (protocols::ARBITRUM, "ARBITRUM_RPC_URL", "https://arbitrum.llamarpc.com"),
    (protocols::OPTIMISM, "OPTIMISM_RPC_URL", "https://optimism.llamarpc.com"),
    (protocols::BASE, "BASE_RPC_URL", "https://base.llamarpc.com"),
    (protocols::BSC, "BSC_RPC_URL", "https://bsc.llamarpc.com"),
    (protocols::AVALANCHE, "AVALANCHE_RPC_URL", "https://avalanche.llamarpc.com"),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub base_url: String,

    // x402
    pub payment_address: Address,
    pub payment_asset: String,
    pub payment_network: String,
    pub price_minor_units: u64,
    pub free_mode: bool,
    pub facilitator_urls: Vec<String>,
    pub facilitator_timeout: Duration,

    // Data sources
    pub rpc_urls: HashMap<u64, String>,
    pub coingecko_api_url: String,
    pub apy_sample_blocks: u64,

    // Redis
    pub redis_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment()?;

        let config = Self {
            environment,
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_var("PORT", "8000")?,
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),

            payment_address: Self::parse_address("PAYMENT_ADDRESS")?,
            payment_asset: std::env::var("PAYMENT_ASSET")
                .unwrap_or_else(|_| DEFAULT_PAYMENT_ASSET.to_string()),
            payment_network: std::env::var("PAYMENT_NETWORK").unwrap_or_else(|_| "base".to_string()),
            price_minor_units: Self::parse_var("PRICE_MINOR_UNITS", "50000")?,
            free_mode: std::env::var("FREE_MODE")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            facilitator_urls: Self::parse_list(
                &std::env::var("FACILITATOR_URLS").unwrap_or_else(|_| DEFAULT_FACILITATORS.to_string()),
            ),
            facilitator_timeout: Duration::from_secs(Self::parse_var("FACILITATOR_TIMEOUT_SECS", "10")?),

            rpc_urls: RPC_ENDPOINTS
                .iter()
                .map(|(chain, var, default)| {
                    (*chain, std::env::var(var).unwrap_or_else(|_| default.to_string()))
                })
                .collect(),
            coingecko_api_url: std::env::var("COINGECKO_API_URL")
                .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
            apy_sample_blocks: Self::parse_var("APY_SAMPLE_BLOCKS", "1000")?,

            redis_url: std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment() -> Result<Environment> {
        let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_address(var: &str) -> Result<Address> {
        let addr_str = std::env::var(var).unwrap_or_else(|_| DEFAULT_PAYMENT_ADDRESS.to_string());
        Address::from_str(&addr_str).with_context(|| format!("Invalid address for {}", var))
    }

    fn parse_var<T>(var: &str, default: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        std::env::var(var)
            .unwrap_or_else(|_| default.to_string())
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", var))
    }

    fn parse_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http") {
            bail!("BASE_URL must be HTTP(S) URL");
        }
        for url in &self.facilitator_urls {
            if !url.starts_with("http") {
                bail!("FACILITATOR_URLS entry {} must be HTTP(S) URL", url);
            }
        }
        if self.facilitator_urls.is_empty() && !self.free_mode {
            bail!("FACILITATOR_URLS must list at least one facilitator unless FREE_MODE=true");
        }
        for (chain, url) in &self.rpc_urls {
            if !url.starts_with("http") {
                bail!("RPC URL for chain {} must be HTTP(S) URL", chain);
            }
        }
        if !self.coingecko_api_url.starts_with("http") {
            bail!("COINGECKO_API_URL must be HTTP(S) URL");
        }

        tracing::info!(
            "Configuration validated for {:?} environment",
            self.environment
        );

        Ok(())
    }

    pub fn x402_settings(&self) -> X402Settings {
        X402Settings {
            pay_to: ethers::utils::to_checksum(&self.payment_address, None),
            asset: self.payment_asset.clone(),
            network: self.payment_network.clone(),
            max_amount_required: self.price_minor_units.to_string(),
            base_url: self.base_url.clone(),
            max_timeout_seconds: 30,
            free_mode: self.free_mode,
        }
    }
}
