//! Error types for the runs cache

use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    Io(Box<std::io::Error>),
    /// A cache or index file exists but cannot be parsed
    Corrupt(serde_json::Error),
    /// Listing the backing store failed during an index rebuild
    Store(blob_listing::BlobStoreError),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Corrupt(err) => write!(f, "Corrupt cache file: {}", err),
            CacheError::Store(err) => write!(f, "Index rebuild failed: {}", err),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            CacheError::Corrupt(err) => Some(err),
            CacheError::Store(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Corrupt(err)
    }
}

impl From<blob_listing::BlobStoreError> for CacheError {
    fn from(err: blob_listing::BlobStoreError) -> Self {
        CacheError::Store(err)
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
