use crate::contracts::{AavePool, CurvePool, UniswapV2Pair, UniswapV3Pool, IERC20};
use crate::error::PoolWatcherError;
use crate::models::PoolMetric;
use crate::services::pricing::address_key;
use crate::services::protocols::{self, PoolKind, Protocol};
use crate::services::{CacheService, PoolDataSource, PriceService};
use anyhow::Result;
use async_trait::async_trait;
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Address, BlockNumber, Filter, I256, U256},
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

const DECIMALS_TTL_SECS: u64 = 86_400;
const MAX_CURVE_COINS: u64 = 8;
const RAY: f64 = 1e27;

const V2_SWAP_EVENT: &str = "Swap(address,uint256,uint256,uint256,uint256,address)";
const V3_SWAP_EVENT: &str = "Swap(address,address,int256,int256,uint160,uint128,int24)";

/// Reads pool state over JSON-RPC, one HTTP provider per configured chain.
pub struct ChainService {
    providers: HashMap<u64, Arc<Provider<Http>>>,
    prices: Arc<PriceService>,
    cache: Arc<CacheService>,
    sample_blocks: u64,
}

struct FeeYield {
    apy: f64,
    fees_24h: f64,
    volume_24h: f64,
}

impl ChainService {
    pub fn new(
        rpc_urls: &HashMap<u64, String>,
        prices: Arc<PriceService>,
        cache: Arc<CacheService>,
        sample_blocks: u64,
    ) -> Result<Self> {
        let mut providers = HashMap::new();
        for (chain, url) in rpc_urls {
            providers.insert(*chain, Arc::new(Provider::<Http>::try_from(url.as_str())?));
        }

        tracing::info!("Chain service configured for chains {:?}", {
            let mut chains: Vec<_> = providers.keys().copied().collect();
            chains.sort_unstable();
            chains
        });

        Ok(Self {
            providers,
            prices,
            cache,
            sample_blocks: sample_blocks.max(1),
        })
    }

    fn provider(&self, chain: u64) -> Result<Arc<Provider<Http>>, PoolWatcherError> {
        self.providers
            .get(&chain)
            .cloned()
            .ok_or(PoolWatcherError::UnsupportedChain(chain))
    }

    async fn decimals(
        &self,
        chain: u64,
        provider: &Arc<Provider<Http>>,
        token: Address,
    ) -> Result<u8, PoolWatcherError> {
        let key = format!("decimals:{}:{}", chain, address_key(&token));
        self.cache
            .get_or_fetch(&key, DECIMALS_TTL_SECS, || async {
                IERC20::new(token, provider.clone())
                    .decimals()
                    .call()
                    .await
                    .map_err(PoolWatcherError::from)
            })
            .await
    }

    async fn sample_range(&self, provider: &Provider<Http>) -> Result<(u64, u64), PoolWatcherError> {
        let latest = provider.get_block_number().await?.as_u64();
        Ok((latest.saturating_sub(self.sample_blocks), latest))
    }

    fn fee_yield(&self, chain: u64, volume_sampled: f64, fee_rate: f64, span_blocks: u64, tvl: f64) -> FeeYield {
        let scale = protocols::blocks_per_day(chain) / span_blocks.max(1) as f64;
        let volume_24h = volume_sampled * scale;
        let fees_24h = volume_24h * fee_rate;
        let apy = if tvl > 0.0 { fees_24h / tvl * 365.0 * 100.0 } else { 0.0 };

        FeeYield {
            apy,
            fees_24h,
            volume_24h,
        }
    }

    async fn pair_v2_metrics(
        &self,
        chain: u64,
        provider: Arc<Provider<Http>>,
        pool: Address,
        protocol: &Protocol,
    ) -> Result<PoolMetric, PoolWatcherError> {
        let pair = UniswapV2Pair::new(pool, provider.clone());
        let (reserve0, reserve1, _) = pair.get_reserves().call().await?;
        let token0 = pair.token_0().call().await?;
        let token1 = pair.token_1().call().await?;

        let d0 = self.decimals(chain, &provider, token0).await?;
        let d1 = self.decimals(chain, &provider, token1).await?;
        let prices = self.prices.prices(chain, &[token0, token1]).await;
        let (p0, p1) = (price_of(&prices, &token0), price_of(&prices, &token1));

        let tvl_usd = normalize(U256::from(reserve0), d0) * p0 + normalize(U256::from(reserve1), d1) * p1;

        let mut metric = PoolMetric::new(address_key(&pool), protocol.id, 0.0, tvl_usd);

        let fee_rate = protocol.fee_bps as f64 / 10_000.0;
        match self.swap_volume_v2(&provider, pool, (d0, p0), (d1, p1)).await {
            Ok((volume, span)) => {
                let yield_ = self.fee_yield(chain, volume, fee_rate, span, tvl_usd);
                metric.apy = yield_.apy;
                metric.fees_24h = Some(yield_.fees_24h);
                metric.volume_24h = Some(yield_.volume_24h);
            }
            Err(e) => tracing::warn!("Swap volume unavailable for {:?}: {}", pool, e),
        }

        Ok(metric)
    }

    /// USD volume of token inflows over the sample span, and the span length.
    async fn swap_volume_v2(
        &self,
        provider: &Provider<Http>,
        pool: Address,
        (d0, p0): (u8, f64),
        (d1, p1): (u8, f64),
    ) -> Result<(f64, u64), PoolWatcherError> {
        let (from, to) = self.sample_range(provider).await?;
        let filter = Filter::new()
            .address(pool)
            .event(V2_SWAP_EVENT)
            .from_block(from)
            .to_block(to);
        let logs = provider.get_logs(&filter).await?;

        let volume = logs
            .iter()
            .filter_map(|log| {
                let amount0_in = word(&log.data, 0)?;
                let amount1_in = word(&log.data, 1)?;
                Some(normalize(amount0_in, d0) * p0 + normalize(amount1_in, d1) * p1)
            })
            .sum();

        Ok((volume, to - from))
    }

    async fn concentrated_v3_metrics(
        &self,
        chain: u64,
        provider: Arc<Provider<Http>>,
        pool: Address,
        protocol: &Protocol,
    ) -> Result<PoolMetric, PoolWatcherError> {
        let contract = UniswapV3Pool::new(pool, provider.clone());
        let token0 = contract.token_0().call().await?;
        let token1 = contract.token_1().call().await?;
        // hundredths of a basis point
        let fee_pips = contract.fee().call().await?;

        let d0 = self.decimals(chain, &provider, token0).await?;
        let d1 = self.decimals(chain, &provider, token1).await?;
        let balance0 = IERC20::new(token0, provider.clone()).balance_of(pool).call().await?;
        let balance1 = IERC20::new(token1, provider.clone()).balance_of(pool).call().await?;
        let prices = self.prices.prices(chain, &[token0, token1]).await;
        let (p0, p1) = (price_of(&prices, &token0), price_of(&prices, &token1));

        let tvl_usd = normalize(balance0, d0) * p0 + normalize(balance1, d1) * p1;
        let mut metric = PoolMetric::new(address_key(&pool), protocol.id, 0.0, tvl_usd);

        let fee_rate = fee_pips as f64 / 1_000_000.0;
        match self.swap_volume_v3(&provider, pool, (d0, p0), (d1, p1)).await {
            Ok((volume, span)) => {
                let yield_ = self.fee_yield(chain, volume, fee_rate, span, tvl_usd);
                metric.apy = yield_.apy;
                metric.fees_24h = Some(yield_.fees_24h);
                metric.volume_24h = Some(yield_.volume_24h);
            }
            Err(e) => tracing::warn!("Swap volume unavailable for {:?}: {}", pool, e),
        }

        Ok(metric)
    }

    async fn swap_volume_v3(
        &self,
        provider: &Provider<Http>,
        pool: Address,
        (d0, p0): (u8, f64),
        (d1, p1): (u8, f64),
    ) -> Result<(f64, u64), PoolWatcherError> {
        let (from, to) = self.sample_range(provider).await?;
        let filter = Filter::new()
            .address(pool)
            .event(V3_SWAP_EVENT)
            .from_block(from)
            .to_block(to);
        let logs = provider.get_logs(&filter).await?;

        // positive amounts flow into the pool
        let volume = logs
            .iter()
            .filter_map(|log| {
                let amount0 = I256::from_raw(word(&log.data, 0)?);
                let amount1 = I256::from_raw(word(&log.data, 1)?);
                let inflow = |amount: I256, decimals: u8, price: f64| {
                    if amount.is_positive() {
                        normalize(amount.into_raw(), decimals) * price
                    } else {
                        0.0
                    }
                };
                Some(inflow(amount0, d0, p0) + inflow(amount1, d1, p1))
            })
            .sum();

        Ok((volume, to - from))
    }

    async fn stableswap_metrics(
        &self,
        chain: u64,
        provider: Arc<Provider<Http>>,
        pool: Address,
        protocol: &Protocol,
    ) -> Result<PoolMetric, PoolWatcherError> {
        let contract = CurvePool::new(pool, provider.clone());

        let mut coins = Vec::new();
        for i in 0..MAX_CURVE_COINS {
            match contract.coins(U256::from(i)).call().await {
                Ok(coin) => coins.push((i, coin)),
                // coins(i) reverts past the last coin
                Err(_) => break,
            }
        }
        if coins.is_empty() {
            return Err(PoolWatcherError::PoolData(format!(
                "{:?} does not look like a Curve pool",
                pool
            )));
        }

        let tokens: Vec<Address> = coins.iter().map(|(_, coin)| *coin).collect();
        let prices = self.prices.prices(chain, &tokens).await;

        let mut tvl_usd = 0.0;
        for (i, coin) in &coins {
            let balance = contract.balances(U256::from(*i)).call().await?;
            let decimals = self.decimals(chain, &provider, *coin).await?;
            tvl_usd += normalize(balance, decimals) * price_of(&prices, coin);
        }

        let mut metric = PoolMetric::new(address_key(&pool), protocol.id, 0.0, tvl_usd);
        match self.virtual_price_growth(chain, &provider, &contract).await {
            Ok(apy) => metric.apy = apy,
            Err(e) => tracing::warn!("Virtual price unavailable for {:?}: {}", pool, e),
        }

        Ok(metric)
    }

    /// Annualised growth of the LP virtual price across the sample span.
    async fn virtual_price_growth(
        &self,
        chain: u64,
        provider: &Provider<Http>,
        contract: &CurvePool<Provider<Http>>,
    ) -> Result<f64, PoolWatcherError> {
        let (from, to) = self.sample_range(provider).await?;
        let now = contract
            .get_virtual_price()
            .block(BlockNumber::Number(to.into()))
            .call()
            .await?;
        let then = contract
            .get_virtual_price()
            .block(BlockNumber::Number(from.into()))
            .call()
            .await?;

        let (now, then) = (normalize(now, 18), normalize(then, 18));
        if then <= 0.0 || to == from {
            return Ok(0.0);
        }

        let periods_per_year = protocols::blocks_per_day(chain) * 365.0 / (to - from) as f64;
        Ok((now / then - 1.0) * periods_per_year * 100.0)
    }

    async fn lending_metrics(
        &self,
        chain: u64,
        provider: Arc<Provider<Http>>,
        asset: Address,
        protocol: &Protocol,
    ) -> Result<PoolMetric, PoolWatcherError> {
        let pool_address = protocols::aave_pool_address(chain)
            .and_then(|addr| Address::from_str(addr).ok())
            .ok_or_else(|| {
                PoolWatcherError::UnsupportedProtocol(format!("aave is not deployed on chain {}", chain))
            })?;

        let reserve = AavePool::new(pool_address, provider.clone())
            .get_reserve_data(asset)
            .call()
            .await?;

        let supply_apy = reserve.2 as f64 / RAY * 100.0;
        let borrow_apy = reserve.4 as f64 / RAY * 100.0;

        let decimals = self.decimals(chain, &provider, asset).await?;
        let supplied = IERC20::new(reserve.8, provider.clone())
            .total_supply()
            .call()
            .await?;
        let prices = self.prices.prices(chain, &[asset]).await;
        let tvl_usd = normalize(supplied, decimals) * price_of(&prices, &asset);

        let mut metric = PoolMetric::new(address_key(&asset), protocol.id, supply_apy, tvl_usd);
        metric.supply_apy = Some(supply_apy);
        metric.borrow_apy = Some(borrow_apy);
        Ok(metric)
    }
}

#[async_trait]
impl PoolDataSource for ChainService {
    async fn ensure_chain(&self, chain: u64) -> Result<(), PoolWatcherError> {
        let provider = self.provider(chain)?;
        let block = provider
            .get_block_number()
            .await
            .map_err(|e| PoolWatcherError::ChainUnavailable(format!("chain {}: {}", chain, e)))?;
        tracing::debug!("Chain {} reachable at block {}", chain, block);
        Ok(())
    }

    async fn pool_metrics(
        &self,
        chain: u64,
        pool: &str,
        protocol_id: &str,
    ) -> Result<PoolMetric, PoolWatcherError> {
        let protocol = protocols::protocol(protocol_id)
            .ok_or_else(|| PoolWatcherError::UnsupportedProtocol(protocol_id.to_string()))?;
        if !protocols::is_deployed(protocol_id, chain) {
            return Err(PoolWatcherError::UnsupportedProtocol(format!(
                "{} is not deployed on chain {}",
                protocol_id, chain
            )));
        }

        let address = Address::from_str(pool)
            .map_err(|e| PoolWatcherError::PoolData(format!("invalid pool address {}: {}", pool, e)))?;
        let provider = self.provider(chain)?;

        let mut metric = match protocol.kind {
            PoolKind::PairV2 => self.pair_v2_metrics(chain, provider, address, protocol).await?,
            PoolKind::ConcentratedV3 => {
                self.concentrated_v3_metrics(chain, provider, address, protocol).await?
            }
            PoolKind::StableSwap => self.stableswap_metrics(chain, provider, address, protocol).await?,
            PoolKind::Lending => self.lending_metrics(chain, provider, address, protocol).await?,
        };

        // keep the caller's spelling so deltas and alerts key on it
        metric.pool_id = pool.to_string();
        Ok(metric)
    }

    fn configured_chains(&self) -> Vec<u64> {
        let mut chains: Vec<u64> = self.providers.keys().copied().collect();
        chains.sort_unstable();
        chains
    }
}

fn price_of(prices: &HashMap<Address, f64>, token: &Address) -> f64 {
    prices.get(token).copied().unwrap_or(0.0)
}

/// `amount / 10^decimals` as a float.
pub fn normalize(amount: U256, decimals: u8) -> f64 {
    ethers::utils::format_units(amount, decimals as u32)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// The `index`-th 32-byte word of ABI-encoded log data.
fn word(data: &[u8], index: usize) -> Option<U256> {
    let start = index * 32;
    data.get(start..start + 32).map(U256::from_big_endian)
}
