//! Cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current version of the on-disk cache file
pub const CACHE_FILE_VERSION: u32 = 1;

/// A single recorded execution of a test suite, as returned to clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Run {
    pub run_id: String,
    pub suite: String,
    pub version: String,
    pub build_number: String,
    pub env: String,
    pub platform: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: String,
    pub report_url: String,
}

/// A run as stored in the cache, tagged with the blob it was read from.
///
/// Entries written before the marker existed deserialize with `None` and
/// are never dropped by reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRun {
    #[serde(flatten)]
    pub run: Run,
    #[serde(
        rename = "_blob_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_blob_name: Option<String>,
}

impl CachedRun {
    pub fn new(run: Run, source_blob_name: impl Into<String>) -> Self {
        Self {
            run,
            source_blob_name: Some(source_blob_name.into()),
        }
    }
}

/// One page of listing results plus the cursor for the next page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultPage {
    pub items: Vec<CachedRun>,
    pub next_cursor: Option<String>,
}

impl ResultPage {
    /// Strip internal markers for the public response shape
    pub fn into_response(self) -> RunsResponse {
        RunsResponse {
            items: self.items.into_iter().map(|item| item.run).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

/// Public response for a runs listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunsResponse {
    pub items: Vec<Run>,
    pub next_cursor: Option<String>,
}

/// Values the result cache can hold.
///
/// Tagged so new value kinds can be added without misreading old files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheValue {
    RunsPage(ResultPage),
}

/// A cache entry as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskEntry {
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub last_access: Option<DateTime<Utc>>,
    /// Kept untyped so one unreadable value does not invalidate the file
    pub value: serde_json::Value,
}

/// On-disk cache file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    #[serde(default)]
    pub version: u32,
    pub ttl_seconds: u64,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub entries: BTreeMap<String, DiskEntry>,
}

/// On-disk existence index file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    pub saved_at: DateTime<Utc>,
    /// Sorted for stable diffs between rebuilds
    #[serde(default)]
    pub blob_names: Vec<String>,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub index_blobs: usize,
    pub index_saved_at: Option<DateTime<Utc>>,
    pub hits: u64,
    pub misses: u64,
}
