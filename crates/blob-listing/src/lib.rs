//! Blob listing
//!
//! Paged, prefix-filtered listing and object downloads over an object store.
//! Ships an Azure Blob Storage REST client and an in-memory store.

pub mod azure;
pub mod error;
pub mod memory;
pub mod store;

pub use azure::AzureBlobStore;
pub use error::{BlobStoreError, Result};
pub use memory::MemoryBlobStore;
pub use store::{BlobStore, ListPage, ListRequest};
