//! Run listing orchestration
//!
//! Serves a query from the result cache when possible, otherwise walks the
//! store listing page by page, downloads and filters run records, and caches
//! the assembled page.

use crate::cursor::Cursor;
use crate::error::Result;
use crate::layout::{run_from_record, Layout, RunFilters, RunPath, RUN_RECORD_SUFFIX};
use blob_listing::{BlobStore, ListRequest};
use runs_cache::{reconcile, CachedRun, IndexView, ResultPage, RunsCache, RunsResponse};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Remote listing pages fetched per request at most
pub const MAX_PAGES_PER_REQUEST: usize = 5;

const MIN_PAGE_SIZE: usize = 300;
const PAGE_SIZE_PER_ITEM: usize = 9;

/// Listing page size used when the cursor does not carry one.
///
/// Filtering happens after listing, so pages are much larger than `limit`.
pub fn default_page_size(limit: usize) -> usize {
    MIN_PAGE_SIZE.max(limit.saturating_mul(PAGE_SIZE_PER_ITEM))
}

/// Normalized query parameters. Serialized as the cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunQuery {
    pub env: Option<String>,
    pub platform: Option<String>,
    pub suite: Option<String>,
    pub q: Option<String>,
    pub limit: usize,
    pub cursor: Option<String>,
}

impl RunQuery {
    fn filters(&self) -> RunFilters {
        RunFilters::new(
            self.suite.as_deref(),
            self.env.as_deref(),
            self.platform.as_deref(),
        )
    }
}

pub struct RunLister {
    store: Arc<dyn BlobStore>,
    cache: Arc<RunsCache>,
    layout: Layout,
}

impl RunLister {
    pub fn new(store: Arc<dyn BlobStore>, cache: Arc<RunsCache>, layout: Layout) -> Self {
        Self {
            store,
            cache,
            layout,
        }
    }

    /// Answer a query. `refresh` bypasses the result cache and rebuilds the index.
    pub async fn list(&self, query: &RunQuery, refresh: bool) -> Result<RunsResponse> {
        let key = RunsCache::cache_key(query);
        let index = self
            .cache
            .existing_blobs(self.store.as_ref(), refresh)
            .await?;

        if !refresh {
            if let Some(cached) = self.cache.get(&key).await {
                return Ok(reconcile(cached, &index).into_response());
            }
        }

        let cursor = Cursor::decode(query.cursor.as_deref()).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring undecodable cursor, starting from the beginning");
            Cursor::default()
        });

        let page = self.fetch(query, &cursor, &index).await?;
        self.cache.set(&key, page.clone()).await;
        Ok(page.into_response())
    }

    /// Walk the store listing from `cursor` and assemble one result page
    pub async fn fetch(
        &self,
        query: &RunQuery,
        cursor: &Cursor,
        index: &IndexView,
    ) -> Result<ResultPage> {
        let limit = query.limit.max(1);
        let filters = query.filters();
        let needle = query
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        let page_size = cursor.page_size.unwrap_or_else(|| default_page_size(limit));
        let request = ListRequest::new(self.layout.listing_prefix(&filters), page_size)
            .with_suffix(RUN_RECORD_SUFFIX);

        let mut items: Vec<CachedRun> = Vec::new();
        let mut token = cursor.token.clone();
        let mut next_cursor: Option<String> = None;
        let mut pages_fetched = 0;

        while items.len() < limit && pages_fetched < MAX_PAGES_PER_REQUEST {
            pages_fetched += 1;

            let page = self
                .store
                .list_page(&request.clone().with_token(token.clone()))
                .await?;

            // Client-side suffix filtering can empty a page mid-listing;
            // only a page with nothing left to follow ends it.
            if page.names.is_empty() && page.next_token.is_none() {
                next_cursor = None;
                break;
            }

            // Resume mid-page only on the first page of this request
            let start = if pages_fetched == 1 { cursor.skip } else { 0 };

            for (i, name) in page.names.iter().enumerate().skip(start) {
                let Some(item) = self
                    .candidate(name, &filters, needle.as_deref(), index)
                    .await
                else {
                    continue;
                };

                items.push(item);
                if items.len() >= limit {
                    next_cursor = Cursor::new(token.clone(), i + 1, page_size).encode();
                    break;
                }
            }

            if items.len() >= limit {
                break;
            }

            match page.next_token {
                Some(next) => {
                    token = Some(next);
                    next_cursor = Cursor::new(token.clone(), 0, page_size).encode();
                }
                None => {
                    next_cursor = None;
                    break;
                }
            }
        }

        items.sort_by(newest_first);

        info!(
            prefix = %request.prefix,
            items = items.len(),
            pages_fetched,
            has_more = next_cursor.is_some(),
            "Listed runs"
        );

        Ok(ResultPage { items, next_cursor })
    }

    /// Turn one listed name into a result item, or `None` to skip it
    async fn candidate(
        &self,
        name: &str,
        filters: &RunFilters,
        needle: Option<&str>,
        index: &IndexView,
    ) -> Option<CachedRun> {
        if !index.admits(name) {
            debug!(blob = %name, "Skipping blob missing from existence index");
            return None;
        }

        let path = self.layout.parse(name)?;
        if !filters.matches(&path) {
            return None;
        }

        let record = self.download_record(name).await?;

        if let Some(needle) = needle {
            if !matches_text(&record, &path, needle) {
                return None;
            }
        }

        let report_url = self.store.public_url(&Layout::report_page(&path));
        Some(CachedRun::new(
            run_from_record(&record, &path, report_url),
            name,
        ))
    }

    async fn download_record(&self, name: &str) -> Option<Value> {
        let bytes = match self.store.download(name).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                debug!(blob = %name, "Skipping run record deleted since listing");
                return None;
            }
            Err(e) => {
                warn!(blob = %name, error = %e, "Skipping run record that failed to download");
                return None;
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) if !map.is_empty() => Some(Value::Object(map)),
            Ok(_) => {
                debug!(blob = %name, "Skipping empty or non-object run record");
                None
            }
            Err(e) => {
                warn!(blob = %name, error = %e, "Skipping run record that failed to parse");
                None
            }
        }
    }
}

/// Case-insensitive match on the run id or anywhere in the record.
///
/// Serializes the whole record per candidate; large records make this the
/// hot path of selective text searches.
fn matches_text(record: &Value, path: &RunPath<'_>, needle: &str) -> bool {
    if path.run_id.to_lowercase().contains(needle) {
        return true;
    }
    record.to_string().to_lowercase().contains(needle)
}

fn sort_key(item: &CachedRun) -> &str {
    if item.run.finished_at.is_empty() {
        &item.run.run_id
    } else {
        &item.run.finished_at
    }
}

fn newest_first(a: &CachedRun, b: &CachedRun) -> Ordering {
    sort_key(b)
        .cmp(sort_key(a))
        .then_with(|| b.source_blob_name.cmp(&a.source_blob_name))
}
