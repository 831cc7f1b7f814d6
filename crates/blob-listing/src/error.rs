//! Error types for blob listing and downloads

use std::fmt;

#[derive(Debug)]
pub enum BlobStoreError {
    Http(Box<reqwest::Error>),
    /// Non-success response from the storage service
    Status { status: u16, url: String },
    NotFound(String),
    Xml(String),
}

impl BlobStoreError {
    /// True when the object is simply absent (deleted by retention, never written)
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobStoreError::NotFound(_))
    }
}

impl fmt::Display for BlobStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobStoreError::Http(err) => write!(f, "HTTP error: {}", err),
            BlobStoreError::Status { status, url } => {
                write!(f, "Storage returned status {} for {}", status, url)
            }
            BlobStoreError::NotFound(name) => write!(f, "Blob not found: {}", name),
            BlobStoreError::Xml(msg) => write!(f, "Invalid listing response: {}", msg),
        }
    }
}

impl std::error::Error for BlobStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BlobStoreError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BlobStoreError {
    fn from(err: reqwest::Error) -> Self {
        BlobStoreError::Http(Box::new(err))
    }
}

impl From<quick_xml::Error> for BlobStoreError {
    fn from(err: quick_xml::Error) -> Self {
        BlobStoreError::Xml(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BlobStoreError>;
