//! Key-value store interface backing both the result cache and the inverted
//! index.
//!
//! The engine only ever talks to [`CacheStore`]; the shipped implementation is
//! [`crate::cache::memory::InMemoryStore`]. Everything here is advisory: the
//! record store stays the source of truth and the engine stays correct (just
//! uncached) when no store is attached.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Typed key namespaces, each with its own prefix and default TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Cached ranked result sets, keyed by query-shape hash.
    Search,
    /// Cached [`crate::model::types::IndexedLead`] projections, keyed by id.
    Lead,
    /// Cached user preferences, keyed by user identifier.
    UserPrefs,
    /// Cached analytics payloads.
    Analytics,
    /// Cached autosuggest lists, keyed by lowercased prefix.
    Suggestions,
    /// Inverted-index token sets, keyed by token.
    Index,
}

impl Namespace {
    /// Key prefix for this namespace.
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Search => "search:",
            Namespace::Lead => "lead:",
            Namespace::UserPrefs => "user_prefs:",
            Namespace::Analytics => "analytics:",
            Namespace::Suggestions => "suggestions:",
            Namespace::Index => "index:",
        }
    }

    /// Full store key for an identifier in this namespace.
    pub fn key(self, id: &str) -> String {
        format!("{}{}", self.prefix(), id)
    }
}

/// Sorted-set key holding the query popularity counter.
pub const POPULAR_SEARCHES_KEY: &str = "popular_searches";

/// Availability of the cache/index store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Healthy,
    Disabled,
    Error,
}

/// Health probe report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealth {
    pub status: CacheStatus,
    pub available: bool,
    pub keys: u64,
}

impl CacheHealth {
    pub fn disabled() -> Self {
        CacheHealth {
            status: CacheStatus::Disabled,
            available: false,
            keys: 0,
        }
    }
}

/// Raw store operations. Values are opaque strings (the typed layer above
/// serializes tagged payloads); sets and the sorted set are native so that
/// membership updates and intersections stay atomic inside the store.
///
/// Implementations must be internally synchronized; the engine calls them
/// from concurrent request handlers without additional locking.
pub trait CacheStore: Send + Sync {
    fn set(&self, key: &str, value: String, ttl: Option<Duration>);
    fn get(&self, key: &str) -> Option<String>;
    fn delete(&self, key: &str) -> bool;
    fn exists(&self, key: &str) -> bool;
    /// Remaining TTL; `None` for a missing key or one without expiry.
    fn ttl(&self, key: &str) -> Option<Duration>;

    fn set_add(&self, key: &str, member: &str);
    fn set_remove(&self, key: &str, member: &str);
    fn set_members(&self, key: &str) -> Vec<String>;
    /// Intersection across all given set keys; empty input yields empty.
    fn set_intersect(&self, keys: &[String]) -> Vec<String>;

    fn zincr(&self, key: &str, member: &str, by: f64);
    /// Top-N members by score, descending.
    fn ztop(&self, key: &str, limit: usize) -> Vec<String>;

    /// Delete every key starting with `prefix`; returns how many were removed.
    fn invalidate_prefix(&self, prefix: &str) -> usize;

    fn key_count(&self) -> u64;
    fn health_check(&self) -> CacheHealth;
}
