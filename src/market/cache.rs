//! In-memory price and chart history caches
//!
//! Both caches live behind the market service's state lock and hold plain
//! maps; expiry is checked on read, nothing is evicted on a timer.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::Instant;

use super::types::{AssetKey, ChartPeriod, PricePoint, PriceSnapshot};

/// Cached price snapshots with a cache-wide freshness stamp
///
/// `last_resolved_ids` is the fingerprint of the most recent successful
/// bulk fetch: an unchanged fingerprint within the lifetime means the
/// cached mapping can be served, a changed one forces a refetch no matter
/// the age.
#[derive(Debug, Default)]
pub struct PriceCache {
    snapshots: HashMap<AssetKey, PriceSnapshot>,
    last_resolved_ids: BTreeSet<String>,
    last_fetched_at: Option<Instant>,
}

impl PriceCache {
    /// True when `ids` matches the last fetch's fingerprint and the cache
    /// is younger than `ttl`
    pub fn is_fresh(&self, ids: &BTreeSet<String>, ttl: Duration) -> bool {
        match self.last_fetched_at {
            Some(fetched_at) => self.last_resolved_ids == *ids && fetched_at.elapsed() <= ttl,
            None => false,
        }
    }

    /// Cached snapshot for one asset
    pub fn snapshot(&self, key: &AssetKey) -> Option<&PriceSnapshot> {
        self.snapshots.get(key)
    }

    /// Full cached mapping
    pub fn snapshots(&self) -> &HashMap<AssetKey, PriceSnapshot> {
        &self.snapshots
    }

    /// Merge a fetch result in and stamp the fetch
    ///
    /// Entries absent from `fetched` are left untouched; the cache never
    /// evicts snapshots for assets that stopped being requested.
    pub fn store(&mut self, fetched: HashMap<AssetKey, PriceSnapshot>, ids: BTreeSet<String>) {
        self.snapshots.extend(fetched);
        self.last_resolved_ids = ids;
        self.last_fetched_at = Some(Instant::now());
    }
}

/// Key of one cached history series
///
/// The price is part of the key: a snapshot fetched at a different price
/// is a different history entry, so a price refresh naturally invalidates
/// the charts derived from the old snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryKey {
    /// Provider ticker id of the snapshot
    pub provider_id: String,
    /// Price the snapshot was fetched at
    pub price: Decimal,
    /// Chart period
    pub period: ChartPeriod,
}

impl HistoryKey {
    /// Key identifying `snapshot`'s series for `period`
    pub fn for_snapshot(snapshot: &PriceSnapshot, period: ChartPeriod) -> Self {
        Self {
            provider_id: snapshot.provider_id.clone(),
            price: snapshot.price,
            period,
        }
    }
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    series: Vec<PricePoint>,
    fetched_at: Instant,
}

/// Cached chart history series
#[derive(Debug, Default)]
pub struct HistoryCache {
    entries: HashMap<HistoryKey, HistoryEntry>,
}

impl HistoryCache {
    /// Cached series for the key
    ///
    /// Day-period entries older than `day_ttl` are treated as absent;
    /// entries for every other period never expire.
    pub fn series(&self, key: &HistoryKey, day_ttl: Duration) -> Option<&Vec<PricePoint>> {
        let entry = self.entries.get(key)?;
        if key.period == ChartPeriod::Day && entry.fetched_at.elapsed() > day_ttl {
            return None;
        }
        Some(&entry.series)
    }

    /// Store a fetched series stamped with the current time
    ///
    /// Empty series are never kept, so a genuinely empty chart is fetched
    /// again on the next request.
    pub fn store(&mut self, key: HistoryKey, series: Vec<PricePoint>) {
        if series.is_empty() {
            return;
        }
        self.entries.insert(
            key,
            HistoryEntry {
                series,
                fetched_at: Instant::now(),
            },
        );
    }
}
