//! Environment-tunable engine settings.
//!
//! Every knob has a code default and a `LEADSCOUT_*` environment override,
//! read through `dotenvy` so a local `.env` file works in development.

use std::time::Duration;

fn env_u64(name: &str, default: u64) -> u64 {
    dotenvy::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    dotenvy::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Per-namespace cache TTLs plus engine-wide limits.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TTL for cached search-result sets.
    pub search_ttl: Duration,
    /// TTL for cached lead projections.
    pub lead_ttl: Duration,
    /// TTL for cached user preferences.
    pub user_prefs_ttl: Duration,
    /// TTL for cached analytics payloads.
    pub analytics_ttl: Duration,
    /// TTL for cached autosuggest lists.
    pub suggestions_ttl: Duration,
    /// Hard cap on candidates retrieved and on the cached ranked superset.
    pub max_search_results: usize,
    /// Default batch size for bulk indexing.
    pub indexing_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            search_ttl: Duration::from_secs(3600),
            lead_ttl: Duration::from_secs(7200),
            user_prefs_ttl: Duration::from_secs(86_400),
            analytics_ttl: Duration::from_secs(1800),
            suggestions_ttl: Duration::from_secs(1800),
            max_search_results: 1000,
            indexing_batch_size: 100,
        }
    }
}

impl EngineConfig {
    /// Load config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let d = EngineConfig::default();
        EngineConfig {
            search_ttl: Duration::from_secs(env_u64(
                "LEADSCOUT_SEARCH_CACHE_TTL",
                d.search_ttl.as_secs(),
            )),
            lead_ttl: Duration::from_secs(env_u64("LEADSCOUT_LEAD_CACHE_TTL", d.lead_ttl.as_secs())),
            user_prefs_ttl: Duration::from_secs(env_u64(
                "LEADSCOUT_USER_PREFS_TTL",
                d.user_prefs_ttl.as_secs(),
            )),
            analytics_ttl: Duration::from_secs(env_u64(
                "LEADSCOUT_ANALYTICS_TTL",
                d.analytics_ttl.as_secs(),
            )),
            suggestions_ttl: Duration::from_secs(env_u64(
                "LEADSCOUT_SUGGESTIONS_TTL",
                d.suggestions_ttl.as_secs(),
            )),
            max_search_results: env_usize("LEADSCOUT_MAX_SEARCH_RESULTS", d.max_search_results),
            indexing_batch_size: env_usize("LEADSCOUT_INDEXING_BATCH_SIZE", d.indexing_batch_size),
        }
    }
}
