//! Error types

use thiserror::Error;

use crate::market::AssetKey;

/// Custom error type
///
/// Only these three failures reach callers. Provider transport failures
/// are absorbed inside the fetch paths and degrade to empty results.
#[derive(Error, Debug)]
pub enum Error {
    /// A bulk price fetch is already in progress for this service
    #[error("Price fetch already in progress")]
    AlreadyFetching,

    /// Chart history requested for an asset with no cached price
    #[error("Asset not priced: {0}")]
    AssetNotPriced(AssetKey),

    /// Chart history fetch failed after retrying
    #[error("Chart history fetch failed")]
    FetchHistory,
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
