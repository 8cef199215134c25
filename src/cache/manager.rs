//! Typed caching layer over a [`CacheStore`].
//!
//! Payloads are a tagged enum with one variant per namespace so that every
//! serialization round-trip is type-checked; a variant mismatch or decode
//! failure reads as a miss, never an error. A manager without a store
//! (`CacheManager::disabled`) turns every operation into a cheap no-op — the
//! engine stays correct, just uncached.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::EngineConfig;
use crate::model::types::{IndexedLead, SearchFilters, SearchResult, SortBy, UserPreferences};

use super::store::{CacheHealth, CacheStore, Namespace, POPULAR_SEARCHES_KEY};

/// A cached ranked result set: the capped superset for one query shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSearchResults {
    pub results: Vec<SearchResult>,
    pub cached_at: DateTime<Utc>,
    pub count: usize,
}

/// Tagged cache payload, one variant per namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheEntry {
    SearchResults(CachedSearchResults),
    Lead(IndexedLead),
    Suggestions(Vec<String>),
    UserPrefs(UserPreferences),
    Analytics(serde_json::Value),
}

/// The shape of a query for cache-key purposes: everything that changes the
/// ranked superset. Pagination is deliberately excluded — the superset is
/// cached once and sliced per request.
#[derive(Serialize)]
struct QueryShape<'a> {
    text: Option<&'a str>,
    filters: &'a SearchFilters,
    sort_by: SortBy,
    preferences: Option<&'a UserPreferences>,
}

#[derive(Clone)]
pub struct CacheManager {
    store: Option<Arc<dyn CacheStore>>,
    config: EngineConfig,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>, config: EngineConfig) -> Self {
        CacheManager {
            store: Some(store),
            config,
        }
    }

    /// A manager with no backing store: every call degrades to a no-op.
    pub fn disabled(config: EngineConfig) -> Self {
        CacheManager {
            store: None,
            config,
        }
    }

    pub fn enabled(&self) -> bool {
        self.store.is_some()
    }

    fn default_ttl(&self, ns: Namespace) -> Option<Duration> {
        match ns {
            Namespace::Search => Some(self.config.search_ttl),
            Namespace::Lead => Some(self.config.lead_ttl),
            Namespace::UserPrefs => Some(self.config.user_prefs_ttl),
            Namespace::Analytics => Some(self.config.analytics_ttl),
            Namespace::Suggestions => Some(self.config.suggestions_ttl),
            // Index token sets live until retracted or reindexed.
            Namespace::Index => None,
        }
    }

    // ---- generic typed entry access -------------------------------------

    pub fn set_entry(&self, ns: Namespace, id: &str, entry: &CacheEntry) {
        let Some(store) = &self.store else { return };
        match serde_json::to_string(entry) {
            Ok(payload) => {
                store.set(&ns.key(id), payload, self.default_ttl(ns));
                debug!(namespace = ns.prefix(), id, "cache_set");
            }
            Err(err) => debug!(namespace = ns.prefix(), id, %err, "cache_encode_failed"),
        }
    }

    pub fn get_entry(&self, ns: Namespace, id: &str) -> Option<CacheEntry> {
        let store = self.store.as_ref()?;
        let raw = store.get(&ns.key(id))?;
        match serde_json::from_str(&raw) {
            Ok(entry) => {
                debug!(namespace = ns.prefix(), id, "cache_hit");
                Some(entry)
            }
            Err(err) => {
                // Treat undecodable payloads as a miss and evict them.
                debug!(namespace = ns.prefix(), id, %err, "cache_decode_failed");
                store.delete(&ns.key(id));
                None
            }
        }
    }

    pub fn delete_entry(&self, ns: Namespace, id: &str) -> bool {
        self.store
            .as_ref()
            .is_some_and(|s| s.delete(&ns.key(id)))
    }

    pub fn exists(&self, ns: Namespace, id: &str) -> bool {
        self.store.as_ref().is_some_and(|s| s.exists(&ns.key(id)))
    }

    pub fn ttl(&self, ns: Namespace, id: &str) -> Option<Duration> {
        self.store.as_ref()?.ttl(&ns.key(id))
    }

    // ---- search results --------------------------------------------------

    /// Stable hash of the query shape (text + filters + sort + preferences).
    pub fn search_key(
        text: Option<&str>,
        filters: &SearchFilters,
        sort_by: SortBy,
        preferences: Option<&UserPreferences>,
    ) -> String {
        let shape = QueryShape {
            text,
            filters,
            sort_by,
            preferences,
        };
        // Struct fields serialize in declaration order, so the JSON form is
        // canonical without extra sorting.
        let encoded = serde_json::to_string(&shape).unwrap_or_default();
        hex::encode(Sha256::digest(encoded.as_bytes()))
    }

    pub fn cache_search_results(&self, key: &str, results: &[SearchResult]) {
        let entry = CacheEntry::SearchResults(CachedSearchResults {
            results: results.to_vec(),
            cached_at: Utc::now(),
            count: results.len(),
        });
        self.set_entry(Namespace::Search, key, &entry);
    }

    pub fn cached_search_results(&self, key: &str) -> Option<CachedSearchResults> {
        match self.get_entry(Namespace::Search, key)? {
            CacheEntry::SearchResults(cached) => Some(cached),
            _ => None,
        }
    }

    pub fn invalidate_search_cache(&self) -> usize {
        self.store
            .as_ref()
            .map_or(0, |s| s.invalidate_prefix(Namespace::Search.prefix()))
    }

    // ---- lead projections ------------------------------------------------

    pub fn cache_lead(&self, lead: &IndexedLead) {
        self.set_entry(
            Namespace::Lead,
            &lead.id.to_string(),
            &CacheEntry::Lead(lead.clone()),
        );
    }

    pub fn cached_lead(&self, lead_id: i64) -> Option<IndexedLead> {
        match self.get_entry(Namespace::Lead, &lead_id.to_string())? {
            CacheEntry::Lead(lead) => Some(lead),
            _ => None,
        }
    }

    pub fn invalidate_lead(&self, lead_id: i64) -> bool {
        self.delete_entry(Namespace::Lead, &lead_id.to_string())
    }

    // ---- suggestions and popularity -------------------------------------

    pub fn cache_suggestions(&self, prefix: &str, suggestions: &[String]) {
        self.set_entry(
            Namespace::Suggestions,
            prefix,
            &CacheEntry::Suggestions(suggestions.to_vec()),
        );
    }

    pub fn cached_suggestions(&self, prefix: &str) -> Option<Vec<String>> {
        match self.get_entry(Namespace::Suggestions, prefix)? {
            CacheEntry::Suggestions(list) => Some(list),
            _ => None,
        }
    }

    /// Bump the popularity counter for a query string.
    pub fn add_popular_search(&self, query: &str) {
        if let Some(store) = &self.store {
            store.zincr(POPULAR_SEARCHES_KEY, query, 1.0);
        }
    }

    pub fn popular_searches(&self, limit: usize) -> Vec<String> {
        self.store
            .as_ref()
            .map_or_else(Vec::new, |s| s.ztop(POPULAR_SEARCHES_KEY, limit))
    }

    // ---- inverted index --------------------------------------------------

    pub fn index_add(&self, token: &str, lead_id: i64) {
        if let Some(store) = &self.store {
            store.set_add(
                &Namespace::Index.key(&token.to_lowercase()),
                &lead_id.to_string(),
            );
        }
    }

    pub fn index_remove(&self, token: &str, lead_id: i64) {
        if let Some(store) = &self.store {
            store.set_remove(
                &Namespace::Index.key(&token.to_lowercase()),
                &lead_id.to_string(),
            );
        }
    }

    pub fn index_members(&self, token: &str) -> Vec<i64> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        parse_ids(store.set_members(&Namespace::Index.key(&token.to_lowercase())))
    }

    /// AND-semantics intersection of the token sets for all given tokens.
    pub fn index_intersect(&self, tokens: &[String]) -> Vec<i64> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        if tokens.is_empty() {
            return Vec::new();
        }
        let keys: Vec<String> = tokens
            .iter()
            .map(|t| Namespace::Index.key(&t.to_lowercase()))
            .collect();
        parse_ids(store.set_intersect(&keys))
    }

    /// Drop every token set, ahead of a whole-corpus reindex.
    pub fn clear_index(&self) -> usize {
        self.store
            .as_ref()
            .map_or(0, |s| s.invalidate_prefix(Namespace::Index.prefix()))
    }

    // ---- health ----------------------------------------------------------

    pub fn health(&self) -> CacheHealth {
        self.store
            .as_ref()
            .map_or_else(CacheHealth::disabled, |s| s.health_check())
    }
}

fn parse_ids(members: Vec<String>) -> Vec<i64> {
    members.into_iter().filter_map(|m| m.parse().ok()).collect()
}
