//! Market data functionality
//!
//! This module provides price and chart-history fetching for wallet tokens,
//! backed by an external market-data provider and in-memory caches.

mod cache;
mod provider;
mod registry;
mod service;
mod types;

pub use cache::*;
pub use provider::*;
pub use registry::*;
pub use service::*;
pub use types::*;
