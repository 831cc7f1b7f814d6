//! In-process blob store

use crate::error::{BlobStoreError, Result};
use crate::store::{BlobStore, ListPage, ListRequest};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Ordered in-memory store.
///
/// Continuation tokens are the index of the next name in the filtered
/// listing, so removing blobs between pages behaves like a real store
/// whose contents shift under a token.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
    list_calls: AtomicU64,
    download_calls: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.blobs.write().await.insert(name.into(), data.into());
    }

    pub async fn remove(&self, name: &str) -> bool {
        self.blobs.write().await.remove(name).is_some()
    }

    /// Number of `list_page` calls served so far
    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::Relaxed)
    }

    /// Number of `download` calls served so far
    pub fn download_calls(&self) -> u64 {
        self.download_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);

        let start = match request.continuation_token.as_deref() {
            Some(token) => token.parse::<usize>().map_err(|_| {
                BlobStoreError::Xml(format!("invalid continuation token: {}", token))
            })?,
            None => 0,
        };
        let page_size = request.page_size.max(1);

        let blobs = self.blobs.read().await;
        let matching: Vec<&String> = blobs
            .keys()
            .filter(|name| name.starts_with(&request.prefix) && request.matches_suffix(name))
            .collect();

        let names: Vec<String> = matching
            .iter()
            .skip(start)
            .take(page_size)
            .map(|name| name.to_string())
            .collect();

        let end = start + names.len();
        let next_token = (end < matching.len()).then(|| end.to_string());

        Ok(ListPage { names, next_token })
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>> {
        self.download_calls.fetch_add(1, Ordering::Relaxed);
        self.blobs
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(name.to_string()))
    }

    fn public_url(&self, name: &str) -> String {
        format!("memory://{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryBlobStore {
        let store = MemoryBlobStore::new();
        for i in 1..=5 {
            store
                .insert(format!("runs/smoke/prod/linux/{}/run.json", i), b"{}".to_vec())
                .await;
            store
                .insert(format!("runs/smoke/prod/linux/{}/index.html", i), b"<html>".to_vec())
                .await;
        }
        store.insert("other/x/run.json", b"{}".to_vec()).await;
        store
    }

    #[tokio::test]
    async fn test_list_pages_with_tokens() {
        let store = seeded().await;
        let request = ListRequest::new("runs/", 2).with_suffix("/run.json");

        let first = store.list_page(&request).await.unwrap();
        assert_eq!(
            first.names,
            vec![
                "runs/smoke/prod/linux/1/run.json",
                "runs/smoke/prod/linux/2/run.json"
            ]
        );
        assert_eq!(first.next_token.as_deref(), Some("2"));

        let second = store
            .list_page(&request.clone().with_token(first.next_token))
            .await
            .unwrap();
        assert_eq!(second.names.len(), 2);

        let third = store
            .list_page(&request.clone().with_token(second.next_token))
            .await
            .unwrap();
        assert_eq!(third.names, vec!["runs/smoke/prod/linux/5/run.json"]);
        assert!(third.next_token.is_none());
        assert_eq!(store.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_list_without_suffix_includes_everything_under_prefix() {
        let store = seeded().await;
        let page = store.list_page(&ListRequest::new("", 100)).await.unwrap();
        assert_eq!(page.names.len(), 11);
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn test_download_and_remove() {
        let store = seeded().await;
        let name = "runs/smoke/prod/linux/1/run.json";
        assert_eq!(store.download(name).await.unwrap(), b"{}".to_vec());

        assert!(store.remove(name).await);
        let err = store.download(name).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.download_calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_token_is_an_error() {
        let store = seeded().await;
        let request = ListRequest::new("", 2).with_token(Some("bogus".to_string()));
        assert!(store.list_page(&request).await.is_err());
    }
}
