use crate::models::ProtocolSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Constant-product pair exposing `getReserves`.
    PairV2,
    /// Concentrated liquidity pool exposing `slot0`/`fee`.
    ConcentratedV3,
    /// Curve stableswap pool.
    StableSwap,
    /// Aave v3 reserve, identified by its underlying asset.
    Lending,
}

impl PoolKind {
    pub fn label(self) -> &'static str {
        match self {
            PoolKind::PairV2 | PoolKind::ConcentratedV3 | PoolKind::StableSwap => "dex",
            PoolKind::Lending => "lending",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Protocol {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: PoolKind,
    /// Swap fee in basis points for pair pools; v3 reads it on-chain.
    pub fee_bps: u32,
    pub chains: &'static [u64],
}

pub const ETHEREUM: u64 = 1;
pub const POLYGON: u64 = 137;
pub const ARBITRUM: u64 = 42161;
pub const OPTIMISM: u64 = 10;
pub const BASE: u64 = 8453;
pub const BSC: u64 = 56;
pub const AVALANCHE: u64 = 43114;

pub const SUPPORTED_CHAINS: [u64; 7] = [ETHEREUM, POLYGON, ARBITRUM, OPTIMISM, BASE, BSC, AVALANCHE];

pub const PROTOCOLS: &[Protocol] = &[
    Protocol {
        id: "uniswap-v2",
        name: "Uniswap V2",
        kind: PoolKind::PairV2,
        fee_bps: 30,
        chains: &[ETHEREUM, POLYGON, ARBITRUM, OPTIMISM, BASE, BSC, AVALANCHE],
    },
    Protocol {
        id: "uniswap-v3",
        name: "Uniswap V3",
        kind: PoolKind::ConcentratedV3,
        fee_bps: 0,
        chains: &[ETHEREUM, POLYGON, ARBITRUM, OPTIMISM, BASE],
    },
    Protocol {
        id: "sushiswap",
        name: "SushiSwap",
        kind: PoolKind::PairV2,
        fee_bps: 30,
        chains: &[ETHEREUM, POLYGON, ARBITRUM, OPTIMISM, BASE, BSC, AVALANCHE],
    },
    Protocol {
        id: "aave",
        name: "Aave",
        kind: PoolKind::Lending,
        fee_bps: 0,
        chains: &[ETHEREUM, POLYGON, ARBITRUM, OPTIMISM, BASE, AVALANCHE],
    },
    Protocol {
        id: "curve",
        name: "Curve Finance",
        kind: PoolKind::StableSwap,
        fee_bps: 0,
        chains: &[ETHEREUM, POLYGON, ARBITRUM, OPTIMISM],
    },
    Protocol {
        id: "pancakeswap",
        name: "PancakeSwap",
        kind: PoolKind::PairV2,
        fee_bps: 25,
        chains: &[BSC],
    },
    Protocol {
        id: "traderjoe",
        name: "TraderJoe",
        kind: PoolKind::PairV2,
        fee_bps: 30,
        chains: &[AVALANCHE],
    },
];

pub fn protocol(id: &str) -> Option<&'static Protocol> {
    PROTOCOLS.iter().find(|p| p.id == id)
}

pub fn supported_protocols() -> Vec<&'static str> {
    PROTOCOLS.iter().map(|p| p.id).collect()
}

pub fn is_deployed(id: &str, chain: u64) -> bool {
    protocol(id).is_some_and(|p| p.chains.contains(&chain))
}

pub fn summaries() -> Vec<ProtocolSummary> {
    PROTOCOLS
        .iter()
        .map(|p| ProtocolSummary {
            id: p.id.to_string(),
            name: p.name.to_string(),
            kind: p.kind.label().to_string(),
            chains: p.chains.to_vec(),
        })
        .collect()
}

/// Average block time in milliseconds, used to scale sampled block spans.
pub fn block_time_ms(chain: u64) -> u64 {
    match chain {
        ETHEREUM => 12_000,
        ARBITRUM => 250,
        BSC => 3_000,
        _ => 2_000,
    }
}

pub fn blocks_per_day(chain: u64) -> f64 {
    86_400_000.0 / block_time_ms(chain) as f64
}

/// CoinGecko asset platform id for token price lookups.
pub fn price_platform(chain: u64) -> Option<&'static str> {
    match chain {
        ETHEREUM => Some("ethereum"),
        POLYGON => Some("polygon-pos"),
        ARBITRUM => Some("arbitrum-one"),
        OPTIMISM => Some("optimistic-ethereum"),
        BASE => Some("base"),
        BSC => Some("binance-smart-chain"),
        AVALANCHE => Some("avalanche"),
        _ => None,
    }
}

/// Aave v3 Pool contract per chain.
pub fn aave_pool_address(chain: u64) -> Option<&'static str> {
    match chain {
        ETHEREUM => Some("0x87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2"),
        POLYGON | ARBITRUM | OPTIMISM | AVALANCHE => Some("0x794a61358D6845594F94dc1DB02A252b5b4814aD"),
        BASE => Some("0xA238Dd80C259a72e81d7e4664a9801593F98d1c5"),
        _ => None,
    }
}
