//! FO3 Market Data Core - token prices and chart history
//!
//! This library provides the market-data layer for the FO3 multi-chain
//! wallet: resolving wallet tokens to price-provider ticker ids, bulk
//! paginated price fetching, per-period chart history, and in-memory
//! caching with independent expiry policies.

pub mod error;
pub mod market;

// Re-export commonly used types for convenience
pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
