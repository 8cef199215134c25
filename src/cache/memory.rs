//! Process-shared in-memory implementation of [`CacheStore`].
//!
//! Expiry is lazy: entries past their deadline are dropped on access and
//! swept opportunistically during writes. Cloning the store clones a handle
//! to the same underlying map, so every engine instance in the process sees
//! one coherent cache, index, and popularity counter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fxhash::{FxHashMap, FxHashSet};
use parking_lot::Mutex;

use super::store::{CacheHealth, CacheStatus, CacheStore};

enum Value {
    Blob(String),
    Set(FxHashSet<String>),
    SortedSet(FxHashMap<String, f64>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<FxHashMap<String, Entry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let entry = Entry {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.inner.lock().insert(key.to_string(), entry);
    }

    /// Run `f` against the live (non-expired) entry for `key`, dropping the
    /// entry first if its deadline has passed.
    fn with_live<R>(&self, key: &str, f: impl FnOnce(&mut Entry) -> R) -> Option<R> {
        let mut map = self.inner.lock();
        let now = Instant::now();
        if map.get(key).is_some_and(|e| e.expired(now)) {
            map.remove(key);
            return None;
        }
        map.get_mut(key).map(f)
    }

    fn sweep(&self) {
        let now = Instant::now();
        self.inner.lock().retain(|_, e| !e.expired(now));
    }
}

impl CacheStore for InMemoryStore {
    fn set(&self, key: &str, value: String, ttl: Option<Duration>) {
        self.insert(key, Value::Blob(value), ttl);
    }

    fn get(&self, key: &str) -> Option<String> {
        self.with_live(key, |e| match &e.value {
            Value::Blob(s) => Some(s.clone()),
            _ => None,
        })
        .flatten()
    }

    fn delete(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    fn exists(&self, key: &str) -> bool {
        self.with_live(key, |_| ()).is_some()
    }

    fn ttl(&self, key: &str) -> Option<Duration> {
        self.with_live(key, |e| {
            e.expires_at
                .map(|at| at.saturating_duration_since(Instant::now()))
        })
        .flatten()
    }

    fn set_add(&self, key: &str, member: &str) {
        let mut map = self.inner.lock();
        let now = Instant::now();
        if map.get(key).is_some_and(|e| e.expired(now)) {
            map.remove(key);
        }
        let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(FxHashSet::default()),
            expires_at: None,
        });
        if let Value::Set(set) = &mut entry.value {
            set.insert(member.to_string());
        }
    }

    fn set_remove(&self, key: &str, member: &str) {
        self.with_live(key, |e| {
            if let Value::Set(set) = &mut e.value {
                set.remove(member);
            }
        });
    }

    fn set_members(&self, key: &str) -> Vec<String> {
        self.with_live(key, |e| match &e.value {
            Value::Set(set) => {
                let mut members: Vec<String> = set.iter().cloned().collect();
                members.sort();
                members
            }
            _ => Vec::new(),
        })
        .unwrap_or_default()
    }

    fn set_intersect(&self, keys: &[String]) -> Vec<String> {
        let Some((first, rest)) = keys.split_first() else {
            return Vec::new();
        };
        let mut acc: FxHashSet<String> = self.set_members(first).into_iter().collect();
        for key in rest {
            if acc.is_empty() {
                break;
            }
            let other: FxHashSet<String> = self.set_members(key).into_iter().collect();
            acc.retain(|m| other.contains(m));
        }
        let mut members: Vec<String> = acc.into_iter().collect();
        members.sort();
        members
    }

    fn zincr(&self, key: &str, member: &str, by: f64) {
        let mut map = self.inner.lock();
        let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::SortedSet(FxHashMap::default()),
            expires_at: None,
        });
        if let Value::SortedSet(scores) = &mut entry.value {
            *scores.entry(member.to_string()).or_insert(0.0) += by;
        }
    }

    fn ztop(&self, key: &str, limit: usize) -> Vec<String> {
        self.with_live(key, |e| match &e.value {
            Value::SortedSet(scores) => {
                let mut ranked: Vec<(&String, f64)> =
                    scores.iter().map(|(m, s)| (m, *s)).collect();
                // Score descending, member ascending for determinism.
                ranked.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.0.cmp(b.0))
                });
                ranked.into_iter().take(limit).map(|(m, _)| m.clone()).collect()
            }
            _ => Vec::new(),
        })
        .unwrap_or_default()
    }

    fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut map = self.inner.lock();
        let before = map.len();
        map.retain(|k, _| !k.starts_with(prefix));
        before - map.len()
    }

    fn key_count(&self) -> u64 {
        self.sweep();
        self.inner.lock().len() as u64
    }

    fn health_check(&self) -> CacheHealth {
        // Same probe the engine's stats report expects: a set/get/delete
        // round trip on a throwaway key.
        let probe = "health_check_probe";
        self.set(probe, "ok".to_string(), Some(Duration::from_secs(10)));
        let ok = self.get(probe).as_deref() == Some("ok");
        self.delete(probe);
        CacheHealth {
            status: if ok { CacheStatus::Healthy } else { CacheStatus::Error },
            available: ok,
            keys: self.key_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip_and_delete() {
        let store = InMemoryStore::new();
        store.set("k", "v".into(), None);
        assert_eq!(store.get("k").as_deref(), Some("v"));
        assert!(store.exists("k"));
        assert!(store.delete("k"));
        assert!(!store.exists("k"));
        assert!(store.get("k").is_none());
    }

    #[test]
    fn expired_entries_read_as_missing() {
        let store = InMemoryStore::new();
        store.set("gone", "v".into(), Some(Duration::from_nanos(1)));
        std::thread::sleep(Duration::from_millis(2));
        assert!(store.get("gone").is_none());
        assert!(!store.exists("gone"));
    }

    #[test]
    fn ttl_reports_remaining_time() {
        let store = InMemoryStore::new();
        store.set("k", "v".into(), Some(Duration::from_secs(60)));
        let remaining = store.ttl("k").expect("ttl present");
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(50));
        store.set("forever", "v".into(), None);
        assert!(store.ttl("forever").is_none());
    }

    #[test]
    fn set_membership_is_idempotent() {
        let store = InMemoryStore::new();
        store.set_add("index:saas", "1");
        store.set_add("index:saas", "1");
        store.set_add("index:saas", "2");
        assert_eq!(store.set_members("index:saas"), vec!["1", "2"]);
        store.set_remove("index:saas", "1");
        assert_eq!(store.set_members("index:saas"), vec!["2"]);
    }

    #[test]
    fn intersection_has_and_semantics() {
        let store = InMemoryStore::new();
        for id in ["1", "2", "3"] {
            store.set_add("index:saas", id);
        }
        for id in ["2", "3", "4"] {
            store.set_add("index:cloud", id);
        }
        let keys = vec!["index:saas".to_string(), "index:cloud".to_string()];
        assert_eq!(store.set_intersect(&keys), vec!["2", "3"]);
        assert!(store.set_intersect(&[]).is_empty());

        let with_missing = vec!["index:saas".to_string(), "index:absent".to_string()];
        assert!(store.set_intersect(&with_missing).is_empty());
    }

    #[test]
    fn sorted_set_ranks_by_score_then_member() {
        let store = InMemoryStore::new();
        store.zincr("popular", "saas", 1.0);
        store.zincr("popular", "saas", 1.0);
        store.zincr("popular", "fintech", 1.0);
        store.zincr("popular", "agro", 1.0);
        assert_eq!(store.ztop("popular", 2), vec!["saas", "agro"]);
    }

    #[test]
    fn prefix_invalidation_only_touches_prefix() {
        let store = InMemoryStore::new();
        store.set("search:a", "1".into(), None);
        store.set("search:b", "2".into(), None);
        store.set("lead:1", "3".into(), None);
        assert_eq!(store.invalidate_prefix("search:"), 2);
        assert!(store.get("lead:1").is_some());
    }

    #[test]
    fn health_probe_round_trips() {
        let store = InMemoryStore::new();
        let health = store.health_check();
        assert!(health.available);
        assert_eq!(health.status, CacheStatus::Healthy);
    }
}
