//! Ticker id registry
//!
//! Resolves wallet assets to the price provider's canonical ticker ids
//! using the provider's full coin catalog. The catalog is fetched lazily,
//! shared process-wide, and loaded at most once after a success.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::provider::{CatalogEntry, ProviderClient, ProviderError};
use super::types::RequestedAsset;

/// Catalog fetch attempts before giving up (one retry)
const CATALOG_FETCH_ATTEMPTS: u32 = 2;

/// Zero address some platforms list in place of an empty value
const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Process-wide registry of provider ticker ids
///
/// One registry is created at application startup and shared (`Arc`) by
/// every market service. Concurrent first calls share a single in-flight
/// catalog fetch.
pub struct TickerRegistry {
    provider: Arc<dyn ProviderClient>,
    catalog: OnceCell<Arc<Vec<CatalogEntry>>>,
}

impl TickerRegistry {
    /// Create a registry backed by the given provider
    pub fn new(provider: Arc<dyn ProviderClient>) -> Self {
        Self {
            provider,
            catalog: OnceCell::new(),
        }
    }

    /// The provider's coin catalog, fetched on first call
    ///
    /// Concurrent callers share one in-flight fetch, but only a success
    /// is shared: a waiter that sees the winning fetch fail runs its own
    /// attempt instead of adopting the empty result. A failure after
    /// retry yields an empty catalog to that caller and leaves the slot
    /// unset, so a later call starts a fresh fetch. After a success the
    /// same catalog is returned for the life of the process.
    pub async fn catalog(&self) -> Arc<Vec<CatalogEntry>> {
        match self.catalog.get_or_try_init(|| self.fetch_catalog()).await {
            Ok(entries) => Arc::clone(entries),
            Err(_) => Arc::new(Vec::new()),
        }
    }

    async fn fetch_catalog(&self) -> Result<Arc<Vec<CatalogEntry>>, ProviderError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.supported_coins().await {
                Ok(entries) => {
                    info!("Loaded provider catalog with {} entries", entries.len());
                    return Ok(Arc::new(entries));
                }
                Err(e) => {
                    if attempt >= CATALOG_FETCH_ATTEMPTS {
                        warn!("Catalog fetch failed after {} attempts: {}", attempt, e);
                        return Err(e);
                    }
                    warn!("Catalog fetch attempt {} failed, retrying: {}", attempt, e);
                }
            }
        }
    }
}

/// Resolve one wallet asset to a provider ticker id
///
/// The asset's chain is mapped to the provider's platform name; chains the
/// provider does not list never resolve. The first catalog entry carrying
/// that platform decides the outcome: a null-address value matches the
/// chain's native asset by symbol, otherwise the contract address must
/// match (both comparisons case-insensitive). Entries after the first
/// platform carrier are not considered. When no entry carries the platform
/// at all, the symbol alone is matched across the whole catalog.
pub fn resolve_provider_id(catalog: &[CatalogEntry], asset: &RequestedAsset) -> Option<String> {
    let platform = asset.key.chain().provider_platform()?;

    if let Some(entry) = catalog.iter().find(|e| e.platforms.contains_key(platform)) {
        let matched = match entry.platforms.get(platform) {
            Some(Some(address)) if !is_null_address(address) => {
                address.eq_ignore_ascii_case(asset.key.contract())
            }
            _ => entry.symbol.eq_ignore_ascii_case(&asset.symbol),
        };
        return matched.then(|| entry.id.clone());
    }

    catalog
        .iter()
        .find(|e| e.symbol.eq_ignore_ascii_case(&asset.symbol))
        .map(|e| e.id.clone())
}

fn is_null_address(address: &str) -> bool {
    address.is_empty() || address == "0x0" || address.eq_ignore_ascii_case(ZERO_ADDRESS)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::market::provider::{MarketChart, MarketQuote};
    use crate::market::types::Chain;

    fn entry(id: &str, symbol: &str, platforms: &[(&str, Option<&str>)]) -> CatalogEntry {
        CatalogEntry {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: id.to_string(),
            platforms: platforms
                .iter()
                .map(|(p, a)| (p.to_string(), a.map(|a| a.to_string())))
                .collect(),
        }
    }

    fn asset(symbol: &str, contract: &str, chain: Chain) -> RequestedAsset {
        RequestedAsset::new(symbol, contract, chain)
    }

    #[test]
    fn test_null_address_matches_native_asset_by_symbol() {
        let catalog = vec![entry("ethereum", "ETH", &[("ethereum", Some("0x0"))])];

        let native = asset("eth", "0x9999", Chain::Ethereum);
        assert_eq!(
            resolve_provider_id(&catalog, &native),
            Some("ethereum".to_string())
        );

        let other = asset("weth", "0x9999", Chain::Ethereum);
        assert_eq!(resolve_provider_id(&catalog, &other), None);
    }

    #[test]
    fn test_empty_and_missing_addresses_act_as_null() {
        let by_empty = vec![entry("ethereum", "eth", &[("ethereum", Some(""))])];
        let by_none = vec![entry("ethereum", "eth", &[("ethereum", None)])];

        let native = asset("ETH", "0x9999", Chain::Ethereum);
        assert!(resolve_provider_id(&by_empty, &native).is_some());
        assert!(resolve_provider_id(&by_none, &native).is_some());
    }

    #[test]
    fn test_contract_address_matches_case_insensitively() {
        let catalog = vec![entry("tether", "usdt", &[("ethereum", Some("0xABC"))])];

        let matching = asset("usdt", "0xabc", Chain::Ethereum);
        assert_eq!(
            resolve_provider_id(&catalog, &matching),
            Some("tether".to_string())
        );

        let differing = asset("usdt", "0xdef", Chain::Ethereum);
        assert_eq!(resolve_provider_id(&catalog, &differing), None);
    }

    #[test]
    fn test_first_platform_entry_decides_even_when_a_later_one_would_match() {
        let catalog = vec![
            entry("first-token", "aaa", &[("ethereum", Some("0x111"))]),
            entry("second-token", "bbb", &[("ethereum", Some("0x222"))]),
        ];

        let second = asset("bbb", "0x222", Chain::Ethereum);
        assert_eq!(resolve_provider_id(&catalog, &second), None);
    }

    #[test]
    fn test_symbol_fallback_applies_only_without_a_platform_carrier() {
        let catalog = vec![
            entry("bitcoin", "btc", &[]),
            entry("tether", "usdt", &[("polygon-pos", Some("0xabc"))]),
        ];

        let btc = asset("BTC", "", Chain::Ethereum);
        assert_eq!(
            resolve_provider_id(&catalog, &btc),
            Some("bitcoin".to_string())
        );

        let unknown = asset("doge", "", Chain::Ethereum);
        assert_eq!(resolve_provider_id(&catalog, &unknown), None);
    }

    #[test]
    fn test_unsupported_chains_never_resolve() {
        let catalog = vec![entry("ethereum", "eth", &[("ethereum", Some("0x0"))])];

        let testnet = asset("eth", "0x0", Chain::Sepolia);
        assert_eq!(resolve_provider_id(&catalog, &testnet), None);
    }

    #[test]
    fn test_full_zero_address_is_a_null_sentinel() {
        let catalog = vec![entry(
            "matic-network",
            "matic",
            &[("polygon-pos", Some("0x0000000000000000000000000000000000000000"))],
        )];

        let native = asset("MATIC", "0x1234", Chain::Polygon);
        assert_eq!(
            resolve_provider_id(&catalog, &native),
            Some("matic-network".to_string())
        );
    }

    #[test]
    fn test_empty_platform_map_still_counts_symbol_fallback() {
        let catalog: Vec<CatalogEntry> = vec![CatalogEntry {
            id: "solana".to_string(),
            symbol: "sol".to_string(),
            name: "Solana".to_string(),
            platforms: HashMap::new(),
        }];

        let sol = asset("SOL", "So11111111111111111111111111111111111111112", Chain::Solana);
        assert_eq!(
            resolve_provider_id(&catalog, &sol),
            Some("solana".to_string())
        );
    }

    /// Catalog provider that fails a scripted number of times before serving
    struct ScriptedCatalog {
        entries: Vec<CatalogEntry>,
        failures: AtomicU32,
        calls: AtomicU32,
    }

    impl ScriptedCatalog {
        fn new(entries: Vec<CatalogEntry>, failures: u32) -> Self {
            Self {
                entries,
                failures: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedCatalog {
        async fn supported_coins(&self) -> Result<Vec<CatalogEntry>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ProviderError::Status(500));
            }
            Ok(self.entries.clone())
        }

        async fn market_quotes(
            &self,
            _ids: &str,
            _currency: &str,
            _page: u32,
        ) -> Result<Vec<MarketQuote>, ProviderError> {
            Ok(Vec::new())
        }

        async fn market_chart(
            &self,
            _id: &str,
            _currency: &str,
            _days: u32,
        ) -> Result<MarketChart, ProviderError> {
            Ok(MarketChart::default())
        }
    }

    fn sample_entries() -> Vec<CatalogEntry> {
        vec![entry("ethereum", "eth", &[("ethereum", Some("0x0"))])]
    }

    #[tokio::test]
    async fn test_catalog_retries_once_after_a_failure() {
        let provider = Arc::new(ScriptedCatalog::new(sample_entries(), 1));
        let registry = TickerRegistry::new(provider.clone());

        let catalog = registry.catalog().await;
        assert_eq!(catalog.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retry_yields_empty_and_a_later_call_refetches() {
        let provider = Arc::new(ScriptedCatalog::new(sample_entries(), 2));
        let registry = TickerRegistry::new(provider.clone());

        let catalog = registry.catalog().await;
        assert!(catalog.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let catalog = registry.catalog().await;
        assert_eq!(catalog.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_successful_catalog_is_fetched_at_most_once() {
        let provider = Arc::new(ScriptedCatalog::new(sample_entries(), 0));
        let registry = TickerRegistry::new(provider.clone());

        let first = registry.catalog().await;
        let second = registry.catalog().await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_in_flight_fetch() {
        let provider = Arc::new(ScriptedCatalog::new(sample_entries(), 0));
        let registry = Arc::new(TickerRegistry::new(provider.clone()));

        let a = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.catalog().await }
        });
        let b = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.catalog().await }
        });

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
