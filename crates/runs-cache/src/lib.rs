//! File-backed run listing cache with TTL expiration and LRU eviction
//!
//! Two tiers share one lock: a per-query result cache holding pages of runs,
//! and an existence index of blob names used to drop cached runs whose
//! backing blob has since been deleted. Both tiers are mirrored to JSON
//! files so they survive restarts.

mod error;
mod index;
mod persist;
mod result_cache;
mod service;
mod types;

pub use error::{CacheError, Result};
pub use index::{IndexState, IndexView};
pub use result_cache::{CacheEntry, ResultCache};
pub use service::{reconcile, CacheConfig, RunsCache};
pub use types::{
    CacheFile, CacheStats, CacheValue, CachedRun, DiskEntry, IndexFile, ResultPage, Run,
    RunsResponse,
};
