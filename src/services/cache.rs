use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;

use super::clock::Clock;

#[derive(Clone, Debug)]
struct Entry<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

/// A cached value together with when it was stored.
#[derive(Clone, Debug, PartialEq)]
pub struct Cached<V> {
    pub value: V,
    pub stored_at: DateTime<Utc>,
    pub age: Duration,
}

/// Process-local cache with a fixed time-to-live.
///
/// Expiry is judged against the injected clock on every read, so entries
/// lapse on schedule whether or not anything touches them in between.
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stores `value`, replacing whatever the key held before.
    pub fn insert(&self, key: K, value: V) {
        let stored_at = self.clock.now();
        self.entries.insert(key, Entry { value, stored_at });
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_entry(key).map(|cached| cached.value)
    }

    pub fn get_entry(&self, key: &K) -> Option<Cached<V>> {
        let now = self.clock.now();
        {
            let entry = self.entries.get(key)?;
            let age = now - entry.stored_at;
            if age < self.ttl {
                return Some(Cached {
                    value: entry.value.clone(),
                    stored_at: entry.stored_at,
                    age,
                });
            }
        }
        // a concurrent insert may have refreshed the key since the read
        self.entries
            .remove_if(key, |_, entry| now - entry.stored_at >= self.ttl);
        None
    }

    /// Returns the entry even when it has expired. Used for stale fallbacks
    /// when a refresh fails.
    pub fn get_stale(&self, key: &K) -> Option<Cached<V>> {
        let now = self.clock.now();
        self.entries.get(key).map(|entry| Cached {
            value: entry.value.clone(),
            stored_at: entry.stored_at,
            age: now - entry.stored_at,
        })
    }

    /// Drops every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now - entry.stored_at < self.ttl);
        before - self.entries.len()
    }

    /// Fresh values only.
    pub fn values(&self) -> Vec<V> {
        let now = self.clock.now();
        self.entries
            .iter()
            .filter(|entry| now - entry.stored_at < self.ttl)
            .map(|entry| entry.value.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use chrono::TimeZone;

    fn cache() -> (Arc<ManualClock>, TtlCache<String, u32>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()));
        let cache = TtlCache::new(Duration::minutes(10), clock.clone());
        (clock, cache)
    }

    #[test]
    fn entries_expire_without_traffic() {
        let (clock, cache) = cache();
        cache.insert("ssa".into(), 1);
        clock.advance(Duration::minutes(9));
        assert_eq!(cache.get(&"ssa".to_string()), Some(1));
        clock.advance(Duration::minutes(1));
        assert_eq!(cache.get(&"ssa".to_string()), None);
        assert!(cache.get_stale(&"ssa".to_string()).is_none(), "Expired read evicts the entry");
    }

    #[test]
    fn insert_replaces_and_resets_age() {
        let (clock, cache) = cache();
        cache.insert("ssa".into(), 1);
        clock.advance(Duration::minutes(8));
        cache.insert("ssa".into(), 2);
        clock.advance(Duration::minutes(8));
        let entry = cache.get_entry(&"ssa".to_string()).unwrap();
        assert_eq!(entry.value, 2);
        assert_eq!(entry.age, Duration::minutes(8));
    }

    #[test]
    fn stale_reads_survive_expiry() {
        let (clock, cache) = cache();
        cache.insert("zip".into(), 7);
        clock.advance(Duration::minutes(30));
        assert_eq!(cache.get_stale(&"zip".to_string()).map(|c| c.value), Some(7));
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.get_stale(&"zip".to_string()).is_none());
    }
}
