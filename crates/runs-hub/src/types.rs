//! Request and response types for the HTTP API

use crate::error::{HubError, Result};
use crate::listing::RunQuery;
use runs_cache::CacheStats;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 500;

/// Raw `/api/runs` query string.
///
/// Everything arrives as text so bad values produce our own 400 body
/// instead of the extractor's rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunsParams {
    pub env: Option<String>,
    pub platform: Option<String>,
    pub suite: Option<String>,
    pub q: Option<String>,
    pub limit: Option<String>,
    pub cursor: Option<String>,
    pub refresh: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl RunsParams {
    pub fn limit(&self) -> Result<usize> {
        let Some(raw) = non_blank(&self.limit) else {
            return Ok(DEFAULT_LIMIT);
        };
        match raw.parse::<usize>() {
            Ok(limit) if (1..=MAX_LIMIT).contains(&limit) => Ok(limit),
            _ => Err(HubError::BadRequest(format!(
                "limit must be an integer between 1 and {}",
                MAX_LIMIT
            ))),
        }
    }

    /// `1`, `true`, `yes` or any other non-zero integer
    pub fn refresh(&self) -> bool {
        match non_blank(&self.refresh) {
            None => false,
            Some(raw) => match raw.parse::<i64>() {
                Ok(n) => n != 0,
                Err(_) => matches!(raw.to_ascii_lowercase().as_str(), "true" | "yes" | "y"),
            },
        }
    }

    /// Normalized query; `refresh` is not part of it so it never splits the cache
    pub fn to_query(&self) -> Result<RunQuery> {
        Ok(RunQuery {
            env: non_blank(&self.env),
            platform: non_blank(&self.platform),
            suite: non_blank(&self.suite),
            q: non_blank(&self.q),
            limit: self.limit()?,
            cursor: non_blank(&self.cursor),
        })
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}
