//! The runs cache service
//!
//! Owns both cache tiers behind a single lock. Network I/O for index
//! rebuilds happens outside the lock; only bookkeeping and disk mirroring
//! are serialized.

use crate::error::Result;
use crate::index::{IndexState, IndexView};
use crate::persist::{read_json, write_json_atomic};
use crate::result_cache::ResultCache;
use crate::types::{CacheFile, CacheStats, CacheValue, IndexFile, ResultPage};
use blob_listing::{BlobStore, ListRequest};
use chrono::{TimeDelta, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Configuration for the runs cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
    pub persist_debounce: Duration,
    pub cache_file: PathBuf,
    pub index_enabled: bool,
    pub index_ttl: Duration,
    pub index_file: PathBuf,
    /// Listing used to rebuild the index; its token is ignored
    pub index_listing: ListRequest,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(720),
            max_entries: 3000,
            persist_debounce: Duration::from_secs(2),
            cache_file: PathBuf::from("data/runs_cache.json"),
            index_enabled: true,
            index_ttl: Duration::from_secs(600),
            index_file: PathBuf::from("data/runs_index.json"),
            index_listing: ListRequest::new("", 5000),
        }
    }
}

/// Longest TTL or debounce honored; keeps expiry timestamps serializable
const MAX_INTERVAL: TimeDelta = TimeDelta::days(36_500);

fn delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration)
        .unwrap_or(MAX_INTERVAL)
        .min(MAX_INTERVAL)
}

struct State {
    results: ResultCache,
    index: IndexState,
}

pub struct RunsCache {
    config: CacheConfig,
    state: Mutex<State>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RunsCache {
    /// Create the cache and load both tiers from disk.
    ///
    /// Unreadable files are logged and treated as empty.
    pub async fn open(config: CacheConfig) -> Self {
        let now = Utc::now();
        let mut results = ResultCache::new(
            delta(config.ttl),
            config.max_entries,
            delta(config.persist_debounce),
        );

        match read_json::<CacheFile>(&config.cache_file).await {
            Ok(Some(file)) => results.load_file(file, now),
            Ok(None) => {}
            Err(e) => warn!(
                path = ?config.cache_file,
                error = %e,
                "Ignoring unreadable cache file"
            ),
        }

        let index = load_index(&config).await;

        info!(
            entries = results.len(),
            index_blobs = index.len(),
            index_enabled = config.index_enabled,
            "Runs cache opened"
        );

        Self {
            config,
            state: Mutex::new(State { results, index }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Flush both tiers to disk regardless of the debounce interval
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        self.persist_results(&mut state, true).await;
        if let Some(file) = state.index.to_file() {
            self.persist_index(&file).await;
        }
        info!(entries = state.results.len(), "Runs cache closed");
    }

    /// Derive a cache key from query parameters.
    ///
    /// Object keys are sorted before hashing, so the same logical query maps
    /// to the same key no matter how the parameters were assembled.
    pub fn cache_key<P: Serialize>(params: &P) -> String {
        let canonical = serde_json::to_value(params)
            .map(canonicalize)
            .unwrap_or(serde_json::Value::Null);
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Fetch a cached page. Does not touch the disk.
    pub async fn get(&self, key: &str) -> Option<ResultPage> {
        let mut state = self.state.lock().await;
        match state.results.get(key, Utc::now()) {
            Some(CacheValue::RunsPage(page)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, items = page.items.len(), "Cache hit");
                Some(page.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    /// Store a page and persist if the debounce interval has passed
    pub async fn set(&self, key: &str, page: ResultPage) {
        let mut state = self.state.lock().await;
        state
            .results
            .insert(key, CacheValue::RunsPage(page), Utc::now());
        self.persist_results(&mut state, false).await;
    }

    /// Current existence index, rebuilding it when stale or forced.
    ///
    /// Returns [`IndexView::Disabled`] when the index is switched off.
    pub async fn existing_blobs(
        &self,
        store: &dyn BlobStore,
        force_refresh: bool,
    ) -> Result<IndexView> {
        if !self.config.index_enabled {
            return Ok(IndexView::Disabled);
        }

        let ttl = delta(self.config.index_ttl);
        {
            let mut state = self.state.lock().await;
            if !force_refresh && state.index.is_fresh(Utc::now(), ttl) {
                return Ok(state.index.view());
            }

            if state.index.is_empty() {
                state.index = load_index(&self.config).await;
                if !force_refresh && state.index.is_fresh(Utc::now(), ttl) {
                    return Ok(state.index.view());
                }
            }
        }

        self.rebuild_index(store).await
    }

    /// Scan the whole store and replace the index snapshot
    pub async fn rebuild_index(&self, store: &dyn BlobStore) -> Result<IndexView> {
        let names = scan_all(store, &self.config.index_listing).await?;

        let mut state = self.state.lock().await;
        state.index.replace(names, Utc::now());
        if let Some(file) = state.index.to_file() {
            self.persist_index(&file).await;
        }
        Ok(state.index.view())
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            entries: state.results.len(),
            index_blobs: state.index.len(),
            index_saved_at: state.index.saved_at(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    async fn persist_results(&self, state: &mut State, force: bool) {
        let now = Utc::now();
        if !state.results.persist_due(now, force) {
            debug!("Cache persist debounced");
            return;
        }

        let file = state.results.to_file(now);
        match write_json_atomic(&self.config.cache_file, &file).await {
            Ok(()) => {
                state.results.mark_persisted(now);
                debug!(entries = file.entries.len(), "Cache persisted");
            }
            Err(e) => warn!(path = ?self.config.cache_file, error = %e, "Failed to persist cache"),
        }
    }

    async fn persist_index(&self, file: &IndexFile) {
        if let Err(e) = write_json_atomic(&self.config.index_file, file).await {
            warn!(path = ?self.config.index_file, error = %e, "Failed to persist index");
        }
    }
}

/// Drop cached runs whose blob is no longer in the index.
///
/// Runs without a blob marker are kept. The cursor is left unchanged, so the
/// page may hold fewer items than were originally requested.
pub fn reconcile(mut page: ResultPage, index: &IndexView) -> ResultPage {
    if !index.is_active() {
        return page;
    }

    let before = page.items.len();
    page.items.retain(|item| {
        item.source_blob_name
            .as_deref()
            .map(|name| index.admits(name))
            .unwrap_or(true)
    });

    let dropped = before - page.items.len();
    if dropped > 0 {
        debug!(dropped, "Dropped cached runs for deleted blobs");
    }
    page
}

async fn load_index(config: &CacheConfig) -> IndexState {
    match read_json::<IndexFile>(&config.index_file).await {
        Ok(Some(file)) => IndexState::from_file(file),
        Ok(None) => IndexState::default(),
        Err(e) => {
            warn!(path = ?config.index_file, error = %e, "Ignoring unreadable index file");
            IndexState::default()
        }
    }
}

/// Page through the entire listing, with no page limit
async fn scan_all(store: &dyn BlobStore, listing: &ListRequest) -> Result<HashSet<String>> {
    info!(prefix = %listing.prefix, "Rebuilding existence index");

    let mut names = HashSet::new();
    let mut request = listing.clone().with_token(None);
    let mut pages = 0usize;

    loop {
        let page = store.list_page(&request).await?;
        pages += 1;
        names.extend(page.names);

        match page.next_token {
            Some(token) => request.continuation_token = Some(token),
            None => break,
        }
    }

    info!(pages, blobs = names.len(), "Existence index rebuilt");
    Ok(names)
}

fn canonicalize(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, serde_json::Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(canonicalize).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CachedRun, Run};
    use blob_listing::MemoryBlobStore;
    use serde::Serialize;
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> CacheConfig {
        CacheConfig {
            cache_file: dir.join("runs_cache.json"),
            index_file: dir.join("runs_index.json"),
            persist_debounce: Duration::ZERO,
            index_listing: ListRequest::new("runs/", 2).with_suffix("/run.json"),
            ..CacheConfig::default()
        }
    }

    fn run_item(id: &str) -> CachedRun {
        CachedRun::new(
            Run {
                run_id: id.to_string(),
                ..Default::default()
            },
            format!("runs/smoke/prod/linux/{}/run.json", id),
        )
    }

    fn page(ids: &[&str]) -> ResultPage {
        ResultPage {
            items: ids.iter().map(|id| run_item(id)).collect(),
            next_cursor: Some("cursor".to_string()),
        }
    }

    async fn seeded_store(ids: &[&str]) -> MemoryBlobStore {
        let store = MemoryBlobStore::new();
        for id in ids {
            store
                .insert(format!("runs/smoke/prod/linux/{}/run.json", id), b"{}".to_vec())
                .await;
            store
                .insert(format!("runs/smoke/prod/linux/{}/index.html", id), b"".to_vec())
                .await;
        }
        store
    }

    #[derive(Serialize)]
    struct ParamsA {
        suite: Option<String>,
        limit: u32,
    }

    #[derive(Serialize)]
    struct ParamsB {
        limit: u32,
        suite: Option<String>,
    }

    #[test]
    fn test_cache_key_is_order_independent() {
        let a = RunsCache::cache_key(&ParamsA {
            suite: Some("smoke".to_string()),
            limit: 50,
        });
        let b = RunsCache::cache_key(&ParamsB {
            limit: 50,
            suite: Some("smoke".to_string()),
        });
        let c = RunsCache::cache_key(&ParamsB {
            limit: 51,
            suite: Some("smoke".to_string()),
        });

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        let mut map = BTreeMap::new();
        map.insert("limit", serde_json::json!(50));
        map.insert("suite", serde_json::json!("smoke"));
        assert_eq!(RunsCache::cache_key(&map), a);
    }

    #[tokio::test]
    async fn test_get_and_set() {
        let dir = tempdir().unwrap();
        let cache = RunsCache::open(test_config(dir.path())).await;

        assert!(cache.get("k").await.is_none());
        cache.set("k", page(&["1", "2"])).await;
        assert_eq!(cache.get("k").await, Some(page(&["1", "2"])));

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_set_persists_and_survives_reopen() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        {
            let cache = RunsCache::open(config.clone()).await;
            cache.set("k", page(&["1"])).await;
        }
        assert!(config.cache_file.exists());

        let reopened = RunsCache::open(config).await;
        assert_eq!(reopened.get("k").await, Some(page(&["1"])));
    }

    #[tokio::test]
    async fn test_debounce_defers_writes_until_close() {
        let dir = tempdir().unwrap();
        let config = CacheConfig {
            persist_debounce: Duration::from_secs(3600),
            ..test_config(dir.path())
        };

        let cache = RunsCache::open(config.clone()).await;
        cache.set("first", page(&["1"])).await;
        cache.set("second", page(&["2"])).await;

        let on_disk: CacheFile = read_json(&config.cache_file).await.unwrap().unwrap();
        assert_eq!(on_disk.entries.len(), 1);

        cache.close().await;
        let on_disk: CacheFile = read_json(&config.cache_file).await.unwrap().unwrap();
        assert_eq!(on_disk.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let dir = tempdir().unwrap();
        let config = CacheConfig {
            max_entries: 3,
            ..test_config(dir.path())
        };
        let cache = RunsCache::open(config.clone()).await;

        for i in 0..4 {
            cache.set(&format!("k{}", i), page(&["1"])).await;
        }

        assert_eq!(cache.stats().await.entries, 3);
        let on_disk: CacheFile = read_json(&config.cache_file).await.unwrap().unwrap();
        assert_eq!(on_disk.entries.len(), 3);
    }

    #[tokio::test]
    async fn test_huge_ttl_is_clamped() {
        let dir = tempdir().unwrap();
        let config = CacheConfig {
            ttl: Duration::from_secs(1_000_000_000_000_000),
            ..test_config(dir.path())
        };
        let cache = RunsCache::open(config.clone()).await;

        cache.set("k", page(&["1"])).await;
        assert!(cache.get("k").await.is_some());

        let on_disk: CacheFile = read_json(&config.cache_file).await.unwrap().unwrap();
        assert_eq!(on_disk.ttl_seconds, MAX_INTERVAL.num_seconds() as u64);

        let reopened = RunsCache::open(config).await;
        assert!(reopened.get("k").await.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_files_start_cold() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::write(&config.cache_file, "{\"ttl_seconds\": 7").unwrap();
        std::fs::write(&config.index_file, "\u{0}\u{1}garbage").unwrap();

        let cache = RunsCache::open(config).await;
        let stats = cache.stats().await;
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.index_blobs, 0);
    }

    #[tokio::test]
    async fn test_disabled_index_returns_disabled_without_listing() {
        let dir = tempdir().unwrap();
        let config = CacheConfig {
            index_enabled: false,
            ..test_config(dir.path())
        };
        let cache = RunsCache::open(config).await;
        let store = seeded_store(&["1"]).await;

        let view = cache.existing_blobs(&store, true).await.unwrap();
        assert!(!view.is_active());
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_index_rebuild_pages_through_everything() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let cache = RunsCache::open(config.clone()).await;
        let store = seeded_store(&["1", "2", "3", "4", "5"]).await;

        let view = cache.existing_blobs(&store, false).await.unwrap();
        assert_eq!(view.len(), 5);
        assert!(view.admits("runs/smoke/prod/linux/5/run.json"));
        assert!(!view.admits("runs/smoke/prod/linux/5/index.html"));
        // page size 2 over 5 names
        assert_eq!(store.list_calls(), 3);

        let on_disk: IndexFile = read_json(&config.index_file).await.unwrap().unwrap();
        assert_eq!(on_disk.blob_names.len(), 5);
    }

    #[tokio::test]
    async fn test_fresh_index_is_served_from_memory() {
        let dir = tempdir().unwrap();
        let cache = RunsCache::open(test_config(dir.path())).await;
        let store = seeded_store(&["1"]).await;

        cache.existing_blobs(&store, false).await.unwrap();
        let calls = store.list_calls();
        cache.existing_blobs(&store, false).await.unwrap();
        assert_eq!(store.list_calls(), calls);

        cache.existing_blobs(&store, true).await.unwrap();
        assert!(store.list_calls() > calls);
    }

    #[tokio::test]
    async fn test_fresh_index_on_disk_avoids_rebuild() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let store = seeded_store(&["1", "2"]).await;
        {
            let cache = RunsCache::open(config.clone()).await;
            cache.rebuild_index(&store).await.unwrap();
        }

        let fresh_store = seeded_store(&["1", "2"]).await;
        let cache = RunsCache::open(config).await;
        let view = cache.existing_blobs(&fresh_store, false).await.unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(fresh_store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_rebuild_drops_deleted_blobs() {
        let dir = tempdir().unwrap();
        let cache = RunsCache::open(test_config(dir.path())).await;
        let store = seeded_store(&["1", "2"]).await;

        cache.existing_blobs(&store, false).await.unwrap();
        store.remove("runs/smoke/prod/linux/2/run.json").await;

        let view = cache.existing_blobs(&store, true).await.unwrap();
        assert!(view.admits("runs/smoke/prod/linux/1/run.json"));
        assert!(!view.admits("runs/smoke/prod/linux/2/run.json"));
    }

    #[test]
    fn test_reconcile_drops_deleted_and_keeps_unmarked() {
        let mut cached = page(&["1", "2"]);
        cached.items.push(CachedRun {
            run: Run {
                run_id: "legacy".to_string(),
                ..Default::default()
            },
            source_blob_name: None,
        });

        let names: HashSet<String> = ["runs/smoke/prod/linux/1/run.json".to_string()].into();
        let view = IndexView::from_names(std::sync::Arc::new(names));

        let served = reconcile(cached, &view);
        let ids: Vec<&str> = served.items.iter().map(|i| i.run.run_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "legacy"]);
        assert_eq!(served.next_cursor.as_deref(), Some("cursor"));
    }

    #[test]
    fn test_reconcile_with_disabled_index_keeps_everything() {
        let served = reconcile(page(&["1", "2"]), &IndexView::Disabled);
        assert_eq!(served.items.len(), 2);
    }
}
