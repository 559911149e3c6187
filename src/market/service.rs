//! Market data service
//!
//! `MarketService` coordinates the ticker registry, the provider client and
//! the in-memory caches: it resolves wallet tokens to ticker ids, runs the
//! paginated bulk price fetch behind a mutual-exclusion guard, and serves
//! per-period chart history with cache lifetimes per period.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::cache::{HistoryCache, HistoryKey, PriceCache};
use super::provider::{MarketChart, MarketQuote, ProviderClient};
use super::registry::{resolve_provider_id, TickerRegistry};
use super::types::{AssetKey, ChartPeriod, PricePoint, PriceSnapshot, RequestedAsset};

/// Page fetch attempts before the page soft-fails to empty (one retry)
const PAGE_FETCH_ATTEMPTS: u32 = 2;

/// Series fetch attempts before the series soft-fails to empty (one retry)
const SERIES_FETCH_ATTEMPTS: u32 = 2;

/// Whole-history attempts before `Error::FetchHistory` (one retry)
const HISTORY_FETCH_ATTEMPTS: u32 = 2;

/// Market service configuration
#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// Quote currency for every price and chart request
    pub quote_currency: String,
    /// Lifetime of the bulk price cache
    pub prices_ttl: Duration,
    /// Lifetime of day-period chart series
    pub day_chart_ttl: Duration,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            quote_currency: "usd".to_string(),
            prices_ttl: Duration::from_secs(3600),
            day_chart_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Default)]
struct MarketState {
    prices: PriceCache,
    history: HistoryCache,
}

/// Clears the in-progress flag when the bulk fetch ends on any path
struct FetchGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FetchGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
            .then_some(Self { flag })
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Price and chart history orchestrator for wallet tokens
///
/// All cache state sits behind one async mutex; the lock is only held for
/// short read/merge windows, never across a network call. At most one bulk
/// price fetch runs per service instance, a concurrent caller is rejected
/// immediately with [`Error::AlreadyFetching`].
pub struct MarketService {
    provider: Arc<dyn ProviderClient>,
    registry: Arc<TickerRegistry>,
    config: MarketConfig,
    state: Mutex<MarketState>,
    fetching_prices: AtomicBool,
}

impl MarketService {
    /// Create a service over a provider and a shared ticker registry
    pub fn new(
        provider: Arc<dyn ProviderClient>,
        registry: Arc<TickerRegistry>,
        config: MarketConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            config,
            state: Mutex::new(MarketState::default()),
            fetching_prices: AtomicBool::new(false),
        }
    }

    /// Current prices for the requested assets
    ///
    /// Assets that do not resolve to a provider ticker id are dropped
    /// silently. When the resolved id set matches the previous fetch and
    /// the cache is still within its lifetime, the cached mapping is
    /// returned without touching the network; a changed id set always
    /// refetches. The returned mapping is the full cache content, which
    /// can include snapshots from earlier fetches for assets no longer
    /// requested.
    pub async fn fetch_prices(
        &self,
        requested: &[RequestedAsset],
    ) -> Result<HashMap<AssetKey, PriceSnapshot>> {
        let _guard =
            FetchGuard::acquire(&self.fetching_prices).ok_or(Error::AlreadyFetching)?;

        let catalog = self.registry.catalog().await;
        let mut resolved: HashMap<String, Vec<AssetKey>> = HashMap::new();
        for asset in requested {
            match resolve_provider_id(&catalog, asset) {
                Some(id) => resolved.entry(id).or_default().push(asset.key.clone()),
                None => debug!("No provider id for {}, dropping", asset.key),
            }
        }
        let ids: BTreeSet<String> = resolved.keys().cloned().collect();

        {
            let state = self.state.lock().await;
            if state.prices.is_fresh(&ids, self.config.prices_ttl) {
                debug!("Serving cached prices for {} ids", ids.len());
                return Ok(state.prices.snapshots().clone());
            }
            if ids.is_empty() {
                debug!("No assets resolved, skipping price fetch");
                return Ok(state.prices.snapshots().clone());
            }
        }

        let fetched = self.fetch_price_pages(&ids, &resolved).await;
        let fetched_count = fetched.len();

        let mut state = self.state.lock().await;
        state.prices.store(fetched, ids);
        info!("Fetched prices for {} assets", fetched_count);
        Ok(state.prices.snapshots().clone())
    }

    /// Last cached snapshot for an asset, without touching the network
    pub async fn cached_price(&self, key: &AssetKey) -> Option<PriceSnapshot> {
        self.state.lock().await.prices.snapshot(key).cloned()
    }

    /// Chart history for one asset over every period, in [`ChartPeriod::ALL`]
    /// order
    ///
    /// The five fetches run concurrently; if any one fails the whole call
    /// fails with no partial result.
    pub async fn fetch_chart_histories(&self, key: &AssetKey) -> Result<Vec<Vec<PricePoint>>> {
        let fetches = ChartPeriod::ALL
            .iter()
            .map(|period| self.fetch_chart_history(key, *period, false));
        future::try_join_all(fetches).await
    }

    /// Chart history for one asset and period
    ///
    /// Fails with [`Error::AssetNotPriced`] when no price snapshot is
    /// cached for the key. `force` bypasses the history cache. Provider
    /// failures degrade to an empty series; an empty series is returned
    /// but never cached.
    pub async fn fetch_chart_history(
        &self,
        key: &AssetKey,
        period: ChartPeriod,
        force: bool,
    ) -> Result<Vec<PricePoint>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.history_for(key, period, force).await {
                Ok(series) => return Ok(series),
                Err(err @ Error::AssetNotPriced(_)) => return Err(err),
                Err(err) => {
                    if attempt >= HISTORY_FETCH_ATTEMPTS {
                        warn!(
                            "Chart history for {} failed after {} attempts: {}",
                            key, attempt, err
                        );
                        return Err(Error::FetchHistory);
                    }
                    warn!("Chart history for {} failed, retrying: {}", key, err);
                }
            }
        }
    }

    async fn history_for(
        &self,
        key: &AssetKey,
        period: ChartPeriod,
        force: bool,
    ) -> Result<Vec<PricePoint>> {
        let history_key = {
            let state = self.state.lock().await;
            let snapshot = state
                .prices
                .snapshot(key)
                .ok_or_else(|| Error::AssetNotPriced(key.clone()))?;
            let history_key = HistoryKey::for_snapshot(snapshot, period);
            if !force {
                if let Some(series) = state.history.series(&history_key, self.config.day_chart_ttl)
                {
                    debug!("Serving cached {:?} series for {}", period, key);
                    return Ok(series.clone());
                }
            }
            history_key
        };

        let series = self.fetch_series(&history_key.provider_id, period).await;

        let mut state = self.state.lock().await;
        state.history.store(history_key, series.clone());
        Ok(series)
    }

    /// Sequential page walk over the markets endpoint
    ///
    /// The first empty page ends the walk; a page that still fails after
    /// its retry is treated as empty, keeping whatever earlier pages
    /// produced.
    async fn fetch_price_pages(
        &self,
        ids: &BTreeSet<String>,
        resolved: &HashMap<String, Vec<AssetKey>>,
    ) -> HashMap<AssetKey, PriceSnapshot> {
        let joined = ids.iter().cloned().collect::<Vec<_>>().join(",");
        let mut result = HashMap::new();
        let mut page = 1;
        loop {
            let quotes = self.fetch_quote_page(&joined, page).await;
            if quotes.is_empty() {
                debug!("Price page {} empty, stopping pagination", page);
                break;
            }
            for quote in &quotes {
                if let Some(keys) = resolved.get(&quote.id) {
                    let snapshot = snapshot_from_quote(quote);
                    for key in keys {
                        result.insert(key.clone(), snapshot.clone());
                    }
                }
            }
            page += 1;
        }
        result
    }

    async fn fetch_quote_page(&self, ids: &str, page: u32) -> Vec<MarketQuote> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .provider
                .market_quotes(ids, &self.config.quote_currency, page)
                .await
            {
                Ok(quotes) => return quotes,
                Err(e) => {
                    if attempt >= PAGE_FETCH_ATTEMPTS {
                        warn!("Price page {} failed after retry, dropping: {}", page, e);
                        return Vec::new();
                    }
                    warn!("Price page {} fetch failed, retrying: {}", page, e);
                }
            }
        }
    }

    async fn fetch_series(&self, provider_id: &str, period: ChartPeriod) -> Vec<PricePoint> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .provider
                .market_chart(provider_id, &self.config.quote_currency, period.days())
                .await
            {
                Ok(chart) => return series_from_chart(&chart),
                Err(e) => {
                    if attempt >= SERIES_FETCH_ATTEMPTS {
                        warn!(
                            "Chart fetch for {} failed after retry, returning empty: {}",
                            provider_id, e
                        );
                        return Vec::new();
                    }
                    warn!("Chart fetch for {} failed, retrying: {}", provider_id, e);
                }
            }
        }
    }
}

fn snapshot_from_quote(quote: &MarketQuote) -> PriceSnapshot {
    let last_updated = quote
        .last_updated
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc));

    PriceSnapshot {
        provider_id: quote.id.clone(),
        symbol: quote.symbol.to_uppercase(),
        price: Decimal::try_from(quote.current_price.unwrap_or(0.0)).unwrap_or_default(),
        change_24h: quote
            .price_change_percentage_24h
            .map(|c| Decimal::try_from(c).unwrap_or_default()),
        change_7d: quote
            .price_change_percentage_7d_in_currency
            .map(|c| Decimal::try_from(c).unwrap_or_default()),
        market_cap: quote
            .market_cap
            .map(|mc| Decimal::try_from(mc).unwrap_or_default()),
        volume_24h: quote
            .total_volume
            .map(|v| Decimal::try_from(v).unwrap_or_default()),
        last_updated,
    }
}

fn series_from_chart(chart: &MarketChart) -> Vec<PricePoint> {
    chart
        .prices
        .iter()
        .filter_map(|pair| {
            DateTime::from_timestamp((pair[0] / 1000.0) as i64, 0).map(|timestamp| PricePoint {
                timestamp,
                price: Decimal::try_from(pair[1]).unwrap_or_default(),
            })
        })
        .collect()
}
