//! Existence index of blob names

use crate::types::IndexFile;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashSet;
use std::sync::Arc;

/// How callers should filter against the index.
///
/// An empty snapshot means the index is unusable (disabled, or never
/// built), which must let everything through rather than hide everything.
#[derive(Debug, Clone, Default)]
pub enum IndexView {
    #[default]
    Disabled,
    Active(Arc<HashSet<String>>),
}

impl IndexView {
    pub fn from_names(names: Arc<HashSet<String>>) -> Self {
        if names.is_empty() {
            IndexView::Disabled
        } else {
            IndexView::Active(names)
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, IndexView::Active(_))
    }

    /// True unless the index is active and does not know this blob
    pub fn admits(&self, blob_name: &str) -> bool {
        match self {
            IndexView::Disabled => true,
            IndexView::Active(names) => names.contains(blob_name),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexView::Disabled => 0,
            IndexView::Active(names) => names.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory snapshot of blob names known to exist
#[derive(Debug, Clone, Default)]
pub struct IndexState {
    saved_at: Option<DateTime<Utc>>,
    blob_names: Arc<HashSet<String>>,
}

impl IndexState {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        self.saved_at
            .map(|saved_at| now - saved_at < ttl)
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.blob_names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blob_names.len()
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.saved_at
    }

    /// Install a freshly scanned snapshot
    pub fn replace(&mut self, names: HashSet<String>, now: DateTime<Utc>) {
        self.blob_names = Arc::new(names);
        self.saved_at = Some(now);
    }

    pub fn view(&self) -> IndexView {
        IndexView::from_names(Arc::clone(&self.blob_names))
    }

    pub fn to_file(&self) -> Option<IndexFile> {
        let saved_at = self.saved_at?;
        let mut blob_names: Vec<String> = self.blob_names.iter().cloned().collect();
        blob_names.sort();
        Some(IndexFile {
            saved_at,
            blob_names,
        })
    }

    pub fn from_file(file: IndexFile) -> Self {
        Self {
            saved_at: Some(file.saved_at),
            blob_names: Arc::new(file.blob_names.into_iter().collect()),
        }
    }
}
