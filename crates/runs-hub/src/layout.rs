//! Blob naming layout for run records
//!
//! Runs live at `<prefix>/<suite>/<env>/<platform>/<run_id>/run.json`, with
//! the HTML report alongside as `index.html`.

use runs_cache::Run;
use serde_json::Value;

pub const RUN_RECORD_SUFFIX: &str = "/run.json";
pub const REPORT_PAGE: &str = "index.html";

/// Segments after the prefix: suite, env, platform, run id, file
const RUN_SEGMENTS: usize = 5;

/// Suite/env/platform filters with wildcards (`all`, blank) normalized away
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilters {
    pub suite: Option<String>,
    pub env: Option<String>,
    pub platform: Option<String>,
}

fn concrete(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
        .map(str::to_string)
}

impl RunFilters {
    pub fn new(suite: Option<&str>, env: Option<&str>, platform: Option<&str>) -> Self {
        Self {
            suite: concrete(suite),
            env: concrete(env),
            platform: concrete(platform),
        }
    }

    pub fn matches(&self, path: &RunPath<'_>) -> bool {
        let ok = |filter: &Option<String>, segment: &str| {
            filter.as_deref().map(|f| f == segment).unwrap_or(true)
        };
        ok(&self.suite, path.suite)
            && ok(&self.env, path.env)
            && ok(&self.platform, path.platform)
    }
}

/// A run record name split into its segments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPath<'a> {
    pub suite: &'a str,
    pub env: &'a str,
    pub platform: &'a str,
    pub run_id: &'a str,
    /// Everything before the file name
    pub dir: &'a str,
}

#[derive(Debug, Clone)]
pub struct Layout {
    prefix: String,
}

impl Layout {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim().trim_matches('/').to_string(),
        }
    }

    /// Prefix covering every run, used for unfiltered scans
    pub fn base_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }

    /// Narrowest listing prefix for the filters.
    ///
    /// Only leading segments can narrow it: env without a suite, or platform
    /// without an env, stop narrowing and are matched client-side.
    pub fn listing_prefix(&self, filters: &RunFilters) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if !self.prefix.is_empty() {
            parts.push(&self.prefix);
        }

        if let Some(suite) = filters.suite.as_deref() {
            parts.push(suite);
            if let Some(env) = filters.env.as_deref() {
                parts.push(env);
                if let Some(platform) = filters.platform.as_deref() {
                    parts.push(platform);
                }
            }
        }

        if parts.is_empty() {
            String::new()
        } else {
            format!("{}/", parts.join("/"))
        }
    }

    /// Split a run record name, or `None` if it has too few segments
    pub fn parse<'a>(&self, name: &'a str) -> Option<RunPath<'a>> {
        let prefix_depth = if self.prefix.is_empty() {
            0
        } else {
            self.prefix.split('/').count()
        };

        let parts: Vec<&str> = name.split('/').collect();
        if parts.len() < prefix_depth + RUN_SEGMENTS {
            return None;
        }

        let tail = &parts[parts.len() - RUN_SEGMENTS..];
        let dir = name.rsplit_once('/').map(|(dir, _)| dir)?;

        Some(RunPath {
            suite: tail[0],
            env: tail[1],
            platform: tail[2],
            run_id: tail[3],
            dir,
        })
    }

    /// Name of the report page next to a run record
    pub fn report_page(path: &RunPath<'_>) -> String {
        format!("{}/{}", path.dir, REPORT_PAGE)
    }
}

fn text_field(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Build a run from its record, falling back to path segments
pub fn run_from_record(record: &Value, path: &RunPath<'_>, report_url: String) -> Run {
    let or = |key: &str, fallback: &str| {
        text_field(record, key).unwrap_or_else(|| fallback.to_string())
    };

    Run {
        run_id: or("run_id", path.run_id),
        suite: or("suite", path.suite),
        version: or("version", "unknown"),
        build_number: or("build_number", "unknown"),
        env: or("env", path.env),
        platform: or("platform", path.platform),
        status: or("status", "unknown"),
        started_at: or("started_at", ""),
        finished_at: or("finished_at", ""),
        report_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filters_normalize_wildcards() {
        let filters = RunFilters::new(Some("all"), Some(" "), Some("linux"));
        assert_eq!(filters.suite, None);
        assert_eq!(filters.env, None);
        assert_eq!(filters.platform.as_deref(), Some("linux"));
    }

    #[test]
    fn test_listing_prefix_narrows_progressively() {
        let layout = Layout::new("/runs/");
        let prefix = |s, e, p| layout.listing_prefix(&RunFilters::new(s, e, p));

        assert_eq!(prefix(None, None, None), "runs/");
        assert_eq!(prefix(Some("smoke"), None, None), "runs/smoke/");
        assert_eq!(prefix(Some("smoke"), Some("prod"), None), "runs/smoke/prod/");
        assert_eq!(
            prefix(Some("smoke"), Some("prod"), Some("linux")),
            "runs/smoke/prod/linux/"
        );
        // A gap stops narrowing
        assert_eq!(prefix(Some("smoke"), None, Some("linux")), "runs/smoke/");
        assert_eq!(prefix(None, Some("prod"), Some("linux")), "runs/");
        assert_eq!(prefix(Some("all"), Some("prod"), None), "runs/");
    }

    #[test]
    fn test_listing_prefix_without_base() {
        let layout = Layout::new("");
        assert_eq!(layout.base_prefix(), "");
        assert_eq!(layout.listing_prefix(&RunFilters::default()), "");
        assert_eq!(
            layout.listing_prefix(&RunFilters::new(Some("smoke"), None, None)),
            "smoke/"
        );
    }

    #[test]
    fn test_parse_run_path() {
        let layout = Layout::new("runs");
        let path = layout.parse("runs/smoke/prod/linux/42/run.json").unwrap();
        assert_eq!(path.suite, "smoke");
        assert_eq!(path.env, "prod");
        assert_eq!(path.platform, "linux");
        assert_eq!(path.run_id, "42");
        assert_eq!(path.dir, "runs/smoke/prod/linux/42");
        assert_eq!(Layout::report_page(&path), "runs/smoke/prod/linux/42/index.html");
    }

    #[test]
    fn test_parse_rejects_short_paths() {
        let layout = Layout::new("runs");
        assert!(layout.parse("runs/smoke/prod/42/run.json").is_none());
        assert!(layout.parse("run.json").is_none());

        let unprefixed = Layout::new("");
        assert!(unprefixed.parse("smoke/prod/linux/42/run.json").is_some());
    }

    #[test]
    fn test_filters_match_segments() {
        let layout = Layout::new("runs");
        let path = layout.parse("runs/smoke/prod/linux/42/run.json").unwrap();

        assert!(RunFilters::new(Some("smoke"), None, None).matches(&path));
        assert!(RunFilters::new(None, Some("prod"), Some("linux")).matches(&path));
        assert!(!RunFilters::new(None, Some("staging"), None).matches(&path));
        assert!(!RunFilters::new(Some("regression"), None, None).matches(&path));
    }

    #[test]
    fn test_run_from_record_uses_fallbacks() {
        let layout = Layout::new("runs");
        let path = layout.parse("runs/smoke/prod/linux/42/run.json").unwrap();
        let record = json!({
            "status": "passed",
            "build_number": 1234,
            "finished_at": "2024-05-01T10:05:00Z",
            "extra": {"nested": true}
        });

        let run = run_from_record(&record, &path, "https://x/index.html".to_string());
        assert_eq!(run.run_id, "42");
        assert_eq!(run.suite, "smoke");
        assert_eq!(run.env, "prod");
        assert_eq!(run.platform, "linux");
        assert_eq!(run.status, "passed");
        assert_eq!(run.build_number, "1234");
        assert_eq!(run.version, "unknown");
        assert_eq!(run.started_at, "");
        assert_eq!(run.finished_at, "2024-05-01T10:05:00Z");
        assert_eq!(run.report_url, "https://x/index.html");
    }

    #[test]
    fn test_run_from_record_prefers_record_values() {
        let layout = Layout::new("runs");
        let path = layout.parse("runs/smoke/prod/linux/42/run.json").unwrap();
        let record = json!({ "run_id": "run-42", "suite": "Smoke Suite" });

        let run = run_from_record(&record, &path, String::new());
        assert_eq!(run.run_id, "run-42");
        assert_eq!(run.suite, "Smoke Suite");
    }
}
