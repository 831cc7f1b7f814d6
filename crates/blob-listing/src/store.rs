//! The object-store seam

use crate::error::Result;
use async_trait::async_trait;

/// One request for a single page of blob names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Only names starting with this prefix are returned
    pub prefix: String,
    /// Only names ending with this suffix are returned
    pub suffix: Option<String>,
    /// Continuation token from a previous page, `None` for the first page
    pub continuation_token: Option<String>,
    pub page_size: usize,
}

impl ListRequest {
    pub fn new(prefix: impl Into<String>, page_size: usize) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: None,
            continuation_token: None,
            page_size,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }

    /// Client-side suffix check for stores that cannot filter on suffix
    pub fn matches_suffix(&self, name: &str) -> bool {
        self.suffix
            .as_deref()
            .map(|suffix| name.ends_with(suffix))
            .unwrap_or(true)
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Blob names in store order
    pub names: Vec<String>,
    /// Token for the following page, `None` when the listing is exhausted
    pub next_token: Option<String>,
}

/// Object store operations needed to serve run listings
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a single page of names with one remote request.
    ///
    /// Stores that filter suffixes client-side may return an empty page
    /// that still has a next token. The listing is exhausted only when
    /// `next_token` is `None`.
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage>;

    /// Download an object's full contents
    async fn download(&self, name: &str) -> Result<Vec<u8>>;

    /// Public URL of an object, used for links handed to clients
    fn public_url(&self, name: &str) -> String;
}
