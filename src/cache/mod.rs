// Bounded containers for narrative tracking.
//
// Both containers cap their own size so that tracking state grows with the
// configured limits, never with the length of the book.

pub mod bounded_cache;
pub mod bounded_list;

pub use bounded_cache::BoundedCache;
pub use bounded_list::BoundedList;

use serde::Serialize;
use thiserror::Error;

/// Default maximum number of entries in a cache.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default fill ratio at which a batch cleanup runs.
pub const DEFAULT_CLEANUP_THRESHOLD: f64 = 0.9;

/// Fraction of capacity removed by one batch cleanup.
pub const CLEANUP_FRACTION: f64 = 0.2;

/// Default maximum number of items in a bounded list.
pub const DEFAULT_LIST_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("key not found")]
    KeyNotFound,
}

/// Point-in-time counters for a single cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub cleanups: u64,
    pub current_size: usize,
    pub capacity: usize,
    pub usage_percentage: f64,
}
