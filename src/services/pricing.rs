use crate::error::PoolWatcherError;
use crate::services::{protocols, CacheService};
use ethers::types::Address;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const PRICE_TTL_SECS: u64 = 60;

/// Used when the price API is unreachable or does not know a token.
const FALLBACK_PRICES: &[(&str, f64)] = &[
    ("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", 3000.0), // WETH
    ("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", 1.0),    // USDC
    ("0xdac17f958d2ee523a2206206994597c13d831ec7", 1.0),    // USDT
    ("0x6b175474e89094c44da98b954eedeac495271d0f", 1.0),    // DAI
    ("0x2260fac5e5542a773aa44fbcfedf7c193bc2c599", 65000.0), // WBTC
    ("0x833589fcd6edb6e08f4c7c32d4f71b54bda02913", 1.0),    // USDC (Base)
    ("0x4200000000000000000000000000000000000006", 3000.0), // WETH (Base, Optimism)
];

pub fn address_key(address: &Address) -> String {
    format!("{:?}", address)
}

/// USD token prices from CoinGecko, cached per chain and token.
pub struct PriceService {
    api_url: String,
    client: reqwest::Client,
    cache: Arc<CacheService>,
}

impl PriceService {
    pub fn new(api_url: impl Into<String>, cache: Arc<CacheService>) -> Result<Self, PoolWatcherError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PoolWatcherError::Config(e.to_string()))?;

        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client,
            cache,
        })
    }

    pub fn fallback_price(address: &Address) -> f64 {
        let key = address_key(address);
        FALLBACK_PRICES
            .iter()
            .find(|(addr, _)| *addr == key)
            .map(|(_, price)| *price)
            .unwrap_or(0.0)
    }

    /// Prices for `tokens`; unknown tokens price at zero.
    pub async fn prices(&self, chain: u64, tokens: &[Address]) -> HashMap<Address, f64> {
        let mut prices = HashMap::new();
        let mut uncached = Vec::new();

        for token in tokens {
            let key = format!("price:{}:{}", chain, address_key(token));
            match self.cache.get::<f64>(&key).await.ok().flatten() {
                Some(price) => {
                    prices.insert(*token, price);
                }
                None => uncached.push(*token),
            }
        }

        if uncached.is_empty() {
            return prices;
        }

        let fetched = match self.fetch(chain, &uncached).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!("Price lookup failed on chain {}: {}, using fallback prices", chain, e);
                HashMap::new()
            }
        };

        for token in uncached {
            let price = fetched
                .get(&address_key(&token))
                .copied()
                .unwrap_or_else(|| Self::fallback_price(&token));
            let key = format!("price:{}:{}", chain, address_key(&token));
            if let Err(e) = self.cache.set(&key, &price, PRICE_TTL_SECS).await {
                tracing::warn!("Failed to cache price {}: {}", key, e);
            }
            prices.insert(token, price);
        }

        prices
    }

    async fn fetch(&self, chain: u64, tokens: &[Address]) -> Result<HashMap<String, f64>, PoolWatcherError> {
        let platform = protocols::price_platform(chain)
            .ok_or(PoolWatcherError::UnsupportedChain(chain))?;
        let addresses = tokens.iter().map(address_key).collect::<Vec<_>>().join(",");

        let response = self
            .client
            .get(format!("{}/simple/token_price/{}", self.api_url, platform))
            .query(&[("contract_addresses", addresses.as_str()), ("vs_currencies", "usd")])
            .send()
            .await
            .map_err(|e| PoolWatcherError::PoolData(format!("price API unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(PoolWatcherError::PoolData(format!(
                "price API returned {}",
                response.status()
            )));
        }

        let body: HashMap<String, HashMap<String, f64>> = response
            .json()
            .await
            .map_err(|e| PoolWatcherError::PoolData(format!("invalid price response: {}", e)))?;

        Ok(body
            .into_iter()
            .filter_map(|(addr, quote)| quote.get("usd").map(|usd| (addr.to_lowercase(), *usd)))
            .collect())
    }
}
