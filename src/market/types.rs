//! Market data types

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Blockchain network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    /// Ethereum mainnet
    Ethereum,
    /// Sepolia testnet
    Sepolia,
    /// BNB Smart Chain
    BinanceSmartChain,
    /// Polygon PoS
    Polygon,
    /// Avalanche C-Chain
    Avalanche,
    /// Arbitrum One
    Arbitrum,
    /// OP Mainnet
    Optimism,
    /// Base
    Base,
    /// Fantom Opera
    Fantom,
    /// Gnosis Chain
    Gnosis,
    /// Solana
    Solana,
}

impl Chain {
    /// Platform name the price provider uses for this chain in its catalog
    ///
    /// Test networks are not listed by the provider and return `None`, so
    /// assets on them never resolve to a ticker id.
    pub fn provider_platform(&self) -> Option<&'static str> {
        match self {
            Chain::Ethereum => Some("ethereum"),
            Chain::Sepolia => None,
            Chain::BinanceSmartChain => Some("binance-smart-chain"),
            Chain::Polygon => Some("polygon-pos"),
            Chain::Avalanche => Some("avalanche"),
            Chain::Arbitrum => Some("arbitrum-one"),
            Chain::Optimism => Some("optimistic-ethereum"),
            Chain::Base => Some("base"),
            Chain::Fantom => Some("fantom"),
            Chain::Gnosis => Some("xdai"),
            Chain::Solana => Some("solana"),
        }
    }

    /// Short lowercase name used in display output and logs
    pub fn name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Sepolia => "sepolia",
            Chain::BinanceSmartChain => "bsc",
            Chain::Polygon => "polygon",
            Chain::Avalanche => "avalanche",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
            Chain::Base => "base",
            Chain::Fantom => "fantom",
            Chain::Gnosis => "gnosis",
            Chain::Solana => "solana",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Identity of a wallet-held asset: contract address plus chain
///
/// The contract address is lower-cased on construction, so two keys for the
/// same token never differ by address casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    contract: String,
    chain: Chain,
}

impl AssetKey {
    /// Create a key for a contract address on a chain
    pub fn new(contract: &str, chain: Chain) -> Self {
        Self {
            contract: contract.to_lowercase(),
            chain,
        }
    }

    /// Canonical (lower-case) contract address
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Chain the contract lives on
    pub fn chain(&self) -> Chain {
        self.chain
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.contract, self.chain)
    }
}

/// One wallet token the caller wants priced
#[derive(Debug, Clone)]
pub struct RequestedAsset {
    /// Token symbol as known to the wallet
    pub symbol: String,
    /// Identity key of the token
    pub key: AssetKey,
}

impl RequestedAsset {
    /// Create a requested asset from its symbol, contract address and chain
    pub fn new(symbol: &str, contract: &str, chain: Chain) -> Self {
        Self {
            symbol: symbol.to_string(),
            key: AssetKey::new(contract, chain),
        }
    }
}

/// Time period selectable for a price history chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartPeriod {
    /// Last 24 hours
    Day,
    /// Last 7 days
    Week,
    /// Last 30 days
    Month,
    /// Last 90 days
    ThreeMonths,
    /// Last 365 days
    Year,
}

impl ChartPeriod {
    /// Every period, in the order charts present them
    pub const ALL: [ChartPeriod; 5] = [
        ChartPeriod::Day,
        ChartPeriod::Week,
        ChartPeriod::Month,
        ChartPeriod::ThreeMonths,
        ChartPeriod::Year,
    ];

    /// Number of days of history requested from the provider
    pub fn days(&self) -> u32 {
        match self {
            ChartPeriod::Day => 1,
            ChartPeriod::Week => 7,
            ChartPeriod::Month => 30,
            ChartPeriod::ThreeMonths => 90,
            ChartPeriod::Year => 365,
        }
    }
}

/// Latest fetched market data for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// Ticker id the provider quotes this asset under
    pub provider_id: String,
    /// Upper-cased asset symbol
    pub symbol: String,
    /// Current price in the quote currency
    pub price: Decimal,
    /// 24 hour price change percentage
    pub change_24h: Option<Decimal>,
    /// 7 day price change percentage
    pub change_7d: Option<Decimal>,
    /// Market capitalization in the quote currency
    pub market_cap: Option<Decimal>,
    /// 24 hour trading volume in the quote currency
    pub volume_24h: Option<Decimal>,
    /// Provider-reported last update time
    pub last_updated: Option<DateTime<Utc>>,
}

/// Single point of a historical price series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Point in time
    pub timestamp: DateTime<Utc>,
    /// Price in the quote currency at that time
    pub price: Decimal,
}
