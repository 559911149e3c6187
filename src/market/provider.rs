//! Market data provider client

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Quotes requested per page from the markets endpoint
const PAGE_SIZE: u32 = 250;

/// Provider transport or decode failure
///
/// These never reach the service's callers; the fetch paths absorb them
/// after one retry and fall back to empty results.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Request failed in transport
    #[error("Request error: {0}")]
    Request(String),

    /// Provider replied with a non-success status
    #[error("Status error: {0}")]
    Status(u16),

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

/// One entry of the provider's coin catalog
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    /// Provider ticker id
    pub id: String,
    /// Asset symbol
    pub symbol: String,
    /// Asset name
    pub name: String,
    /// Platform name to contract address; `None` or an empty string marks
    /// the chain's native asset
    #[serde(default)]
    pub platforms: HashMap<String, Option<String>>,
}

/// One row of a market quotes page
#[derive(Debug, Clone, Deserialize)]
pub struct MarketQuote {
    /// Provider ticker id
    pub id: String,
    /// Asset symbol
    pub symbol: String,
    /// Asset name
    pub name: String,
    /// Current price in the quote currency
    pub current_price: Option<f64>,
    /// Market capitalization in the quote currency
    pub market_cap: Option<f64>,
    /// 24 hour trading volume in the quote currency
    pub total_volume: Option<f64>,
    /// 24 hour price change percentage
    pub price_change_percentage_24h: Option<f64>,
    /// 7 day price change percentage
    pub price_change_percentage_7d_in_currency: Option<f64>,
    /// Last update time as an RFC 3339 string
    pub last_updated: Option<String>,
}

/// Historical chart payload
///
/// An absent or empty `prices` array means the provider has no data for
/// the requested range.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketChart {
    /// `[timestamp in milliseconds, price]` pairs
    #[serde(default)]
    pub prices: Vec<[f64; 2]>,
    /// `[timestamp in milliseconds, market cap]` pairs
    pub market_caps: Option<Vec<[f64; 2]>>,
    /// `[timestamp in milliseconds, volume]` pairs
    pub total_volumes: Option<Vec<[f64; 2]>>,
}

/// Remote market data source
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Full catalog of assets the provider knows, with per-platform
    /// contract addresses
    async fn supported_coins(&self) -> Result<Vec<CatalogEntry>, ProviderError>;

    /// One page of market quotes for a comma-joined ticker id list
    async fn market_quotes(
        &self,
        ids: &str,
        currency: &str,
        page: u32,
    ) -> Result<Vec<MarketQuote>, ProviderError>;

    /// Historical price chart for one ticker id over a number of days
    async fn market_chart(
        &self,
        id: &str,
        currency: &str,
        days: u32,
    ) -> Result<MarketChart, ProviderError>;
}

/// Provider client configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider base URL
    pub base_url: String,
    /// API key (if required)
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            api_key: None,
            timeout: None,
        }
    }
}

/// CoinGecko API client
pub struct CoinGeckoClient {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl CoinGeckoClient {
    /// Create a client from the given configuration
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(ref api_key) = self.config.api_key {
            request = request.header("x-cg-demo-api-key", api_key);
        }
        request
    }

    async fn fetch_json<T>(&self, url: &str) -> Result<T, ProviderError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ProviderClient for CoinGeckoClient {
    async fn supported_coins(&self) -> Result<Vec<CatalogEntry>, ProviderError> {
        let url = format!("{}/coins/list?include_platform=true", self.config.base_url);
        self.fetch_json(&url).await
    }

    async fn market_quotes(
        &self,
        ids: &str,
        currency: &str,
        page: u32,
    ) -> Result<Vec<MarketQuote>, ProviderError> {
        let url = format!(
            "{}/coins/markets?vs_currency={}&ids={}&per_page={}&page={}&price_change_percentage=24h,7d",
            self.config.base_url, currency, ids, PAGE_SIZE, page
        );
        self.fetch_json(&url).await
    }

    async fn market_chart(
        &self,
        id: &str,
        currency: &str,
        days: u32,
    ) -> Result<MarketChart, ProviderError> {
        let url = format!(
            "{}/coins/{}/market_chart?vs_currency={}&days={}",
            self.config.base_url, id, currency, days
        );
        self.fetch_json(&url).await
    }
}
