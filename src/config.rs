//! Configuration resolution for waxmatch
//!
//! Defaults -> TOML file -> environment variables, highest last. The
//! matching thresholds and pool caps are tuned constants inherited from the
//! production matcher; they are exposed as named config fields (rather than
//! burying them as literals) so deployments can re-validate them empirically
//! without a rebuild.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

/// Environment variable naming the TOML config file.
const CONFIG_PATH_ENV: &str = "WAXMATCH_CONFIG";
/// Default TOML config location, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "waxmatch.toml";

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// HTTP listen address.
    pub listen_addr: String,
    /// SQLite database path.
    pub database_path: String,
    /// Base URL of the external playlist API.
    pub source_api_base_url: String,
    /// Per-page timeout for upstream requests, in seconds. A timed-out page
    /// aborts the import like any other transient upstream failure.
    pub page_timeout_secs: u64,
    /// Upstream page size.
    pub page_limit: i64,
    pub matching: MatchingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5731".to_string(),
            database_path: "waxmatch.db".to_string(),
            source_api_base_url: "https://api.spotify.com/v1".to_string(),
            page_timeout_secs: 30,
            page_limit: 100,
            matching: MatchingConfig::default(),
        }
    }
}

/// Matching-engine thresholds and caps.
///
/// The auto-accept thresholds and pool caps carry over from the tuned
/// production values; none of them is proven optimal, which is exactly why
/// they are configuration and not literals.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchingConfig {
    /// Inventory index cache TTL, in seconds.
    pub index_ttl_secs: u64,
    /// Auto-accept an ambiguous-title candidate at or above this score.
    pub title_bucket_accept: f64,
    /// ...or at this score when it also clears `accept_margin` over the
    /// runner-up.
    pub title_bucket_margin_accept: f64,
    /// Required lead over the runner-up for margin-based acceptance.
    pub accept_margin: f64,
    /// Token-pool auto-accept floor (stricter: the pool is noisier than a
    /// title bucket).
    pub pool_accept: f64,
    /// Minimum score for a candidate to be reported at all.
    pub min_candidate_score: f64,
    /// Minimum score for interactive search results.
    pub min_search_score: f64,
    /// Candidates reported per unresolved row.
    pub max_candidates: usize,
    /// Token-pool size cap during batch matching.
    pub matcher_pool_cap: usize,
    /// Token-pool size cap during interactive search.
    pub search_pool_cap: usize,
    /// Normalized-title prefix length for the sparse-pool fallback scan.
    pub title_prefix_len: usize,
    /// Upper clamp for the interactive search result limit.
    pub search_limit_max: usize,
    /// Unmatched rows echoed back in an import response.
    pub unmatched_sample_max: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            index_ttl_secs: 600,
            title_bucket_accept: 0.95,
            title_bucket_margin_accept: 0.90,
            accept_margin: 0.08,
            pool_accept: 0.93,
            min_candidate_score: 0.35,
            min_search_score: 0.25,
            max_candidates: 8,
            matcher_pool_cap: 650,
            search_pool_cap: 1000,
            title_prefix_len: 6,
            search_limit_max: 25,
            unmatched_sample_max: 25,
        }
    }
}

impl MatchingConfig {
    pub fn index_ttl(&self) -> Duration {
        Duration::from_secs(self.index_ttl_secs)
    }
}

impl AppConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    /// Load configuration: TOML file (if present), then environment
    /// overrides for the deployment-specific fields.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        for (var, field) in [
            ("WAXMATCH_LISTEN_ADDR", &mut self.listen_addr),
            ("WAXMATCH_DATABASE_PATH", &mut self.database_path),
            ("WAXMATCH_SOURCE_API_BASE_URL", &mut self.source_api_base_url),
        ] {
            if let Ok(value) = std::env::var(var) {
                let value = value.trim().to_string();
                if value.is_empty() {
                    warn!(var, "Ignoring empty environment override");
                    continue;
                }
                info!(var, "Applying environment override");
                *field = value;
            }
        }
    }
}
