use crate::error::{HubError, Result};
use crate::layout::{Layout, RUN_RECORD_SUFFIX};
use blob_listing::{AzureBlobStore, ListRequest};
use runs_cache::CacheConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Azure caps a single listing page at this many names
const INDEX_LISTING_PAGE_SIZE: usize = 5000;

/// Service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage_account: String,
    pub container: String,
    pub prefix: String,
    pub sas_token: Option<String>,
    pub blob_endpoint: Option<String>,
    pub cache_ttl_secs: u64,
    pub cache_file: PathBuf,
    pub cache_max_entries: usize,
    pub persist_debounce_secs: f64,
    pub index_ttl_secs: u64,
    pub index_enabled: bool,
    pub index_file: PathBuf,
    pub static_dir: PathBuf,
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Parse configuration from any variable lookup
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| {
            var(key)
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|| default.to_string())
        };
        let optional = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = var("PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(8000);

        let cache_ttl_secs = var("RUNS_CACHE_TTL_SECONDS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(720);

        let cache_max_entries = var("RUNS_CACHE_MAX_ENTRIES")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(3000);

        let persist_debounce_secs = var("RUNS_CACHE_PERSIST_DEBOUNCE_SECONDS")
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|s| s.is_finite())
            .unwrap_or(2.0)
            .max(0.0);

        let index_ttl_secs = var("RUNS_INDEX_TTL_SECONDS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(600);

        let index_enabled = var("RUNS_INDEX_FALLBACK_TO_LISTING")
            .map(|v| truthy(&v))
            .unwrap_or(true);

        Self {
            port,
            storage_account: text("REPORTS_STORAGE_ACCOUNT", "allureautotests"),
            container: text("REPORTS_CONTAINER", "reports"),
            prefix: text("REPORTS_PREFIX", "runs").trim_matches('/').to_string(),
            sas_token: optional("REPORTS_SAS_TOKEN"),
            blob_endpoint: optional("REPORTS_BLOB_ENDPOINT"),
            cache_ttl_secs,
            cache_file: PathBuf::from(text("RUNS_CACHE_FILE", "data/runs_cache.json")),
            cache_max_entries,
            persist_debounce_secs,
            index_ttl_secs,
            index_enabled,
            index_file: PathBuf::from(text("RUNS_INDEX_BLOB", "data/runs_index.json")),
            static_dir: PathBuf::from(text("STATIC_DIR", "static")),
        }
    }

    /// Storage settings are checked per request so the UI still loads
    pub fn require_storage(&self) -> Result<()> {
        if self.storage_account.is_empty() || self.container.is_empty() {
            return Err(HubError::Config(
                "REPORTS_STORAGE_ACCOUNT and REPORTS_CONTAINER must be set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.prefix)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            max_entries: self.cache_max_entries,
            persist_debounce: Duration::try_from_secs_f64(self.persist_debounce_secs)
                .unwrap_or(Duration::MAX),
            cache_file: self.cache_file.clone(),
            index_enabled: self.index_enabled,
            index_ttl: Duration::from_secs(self.index_ttl_secs),
            index_file: self.index_file.clone(),
            index_listing: ListRequest::new(self.layout().base_prefix(), INDEX_LISTING_PAGE_SIZE)
                .with_suffix(RUN_RECORD_SUFFIX),
        }
    }

    /// Azure client for the configured container
    pub fn blob_store(&self) -> Result<AzureBlobStore> {
        let store = match self.blob_endpoint.as_deref() {
            Some(endpoint) => {
                url::Url::parse(endpoint).map_err(|e| {
                    HubError::Config(format!("Invalid REPORTS_BLOB_ENDPOINT {}: {}", endpoint, e))
                })?;
                AzureBlobStore::with_endpoint(endpoint, &self.container)
            }
            None => AzureBlobStore::new(&self.storage_account, &self.container),
        };
        Ok(store.with_sas_token(self.sas_token.clone()))
    }
}
