//! Read-through TTL cache for metadata lookups.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A small TTL cache keyed by string
///
/// Backs the `use_local_cache` configuration flag: clients consult it before
/// hitting the broker for metadata (partition lists) and write results back
/// on a miss. Entries expire after the configured TTL.
#[derive(Debug)]
pub struct LocalCache<V> {
    entries: Mutex<HashMap<String, (Instant, V)>>,
    ttl: Duration,
}

impl<V: Clone> LocalCache<V> {
    /// Create a cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Look up a live entry
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.lock().expect("cache lock poisoned");
        entries.get(key).and_then(|(stored_at, value)| {
            if stored_at.elapsed() < self.ttl {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    /// Store a value under the key, replacing any previous entry
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(key.into(), (Instant::now(), value));
    }

    /// Drop a single entry
    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.remove(key);
    }

    /// Drop all entries
    pub fn clear(&self) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.clear();
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cache_hit() {
        let cache = LocalCache::new(Duration::from_secs(60));
        cache.insert("events", vec![0, 1, 2]);
        assert_eq!(cache.get("events"), Some(vec![0, 1, 2]));
        assert_eq!(cache.get("other"), None);
    }

    #[test]
    fn test_cache_expiry() {
        let cache = LocalCache::new(Duration::from_millis(20));
        cache.insert("events", vec![0]);
        assert!(cache.get("events").is_some());

        thread::sleep(Duration::from_millis(30));
        assert!(cache.get("events").is_none());
    }

    #[test]
    fn test_cache_invalidate() {
        let cache = LocalCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.invalidate("a");
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some(2));

        cache.clear();
        assert!(cache.is_empty());
    }
}
