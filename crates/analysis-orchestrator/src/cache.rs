use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Cache TTL used for market data and news (5 minutes)
pub const CACHE_TTL_SECS: i64 = 300;

struct CacheEntry<T> {
    data: T,
    cached_at: DateTime<Utc>,
}

/// Keyed cache whose entries go stale after a fixed number of seconds
pub struct TtlCache<T> {
    entries: DashMap<String, CacheEntry<T>>,
    ttl_secs: i64,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_secs,
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.get_at(key, Utc::now())
    }

    /// Fresh entry for `key`; a stale entry is evicted on the way out
    fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<T> {
        {
            let entry = self.entries.get(key)?;
            if self.is_fresh(&entry, now) {
                return Some(entry.data.clone());
            }
        }
        // The read guard is released above; a fresher insert may have raced in
        self.entries.remove_if(key, |_, entry| !self.is_fresh(entry, now));
        None
    }

    fn is_fresh(&self, entry: &CacheEntry<T>, now: DateTime<Utc>) -> bool {
        (now - entry.cached_at).num_seconds() < self.ttl_secs
    }

    pub fn insert(&self, key: impl Into<String>, data: T) {
        self.insert_at(key, data, Utc::now());
    }

    fn insert_at(&self, key: impl Into<String>, data: T, cached_at: DateTime<Utc>) {
        self.entries.insert(key.into(), CacheEntry { data, cached_at });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
