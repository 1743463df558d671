use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// Entries older than this are treated as absent.
pub const CACHE_TTL_MINUTES: i64 = 5;

#[derive(Debug, Clone)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    /// Repository revision the data was read at
    pub revision: u64,
}

impl<T> CachedData<T> {
    pub fn new(data: T, revision: u64) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
            revision,
        }
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.cached_at
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }
}

pub struct QueryCache<T> {
    name: &'static str,
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedData<T>>>,
}

impl<T: Clone> QueryCache<T> {
    pub fn new(name: &'static str) -> Self {
        Self::with_ttl(name, Duration::minutes(CACHE_TTL_MINUTES))
    }

    pub fn with_ttl(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A fresh entry for `key` read at `revision`, if any.
    /// Expired or outdated entries stay in place until overwritten or cleared.
    pub fn get(&self, key: &str, revision: u64) -> Option<T> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(cached) if cached.is_expired(self.ttl) => {
                debug!(cache = self.name, key = key, "Cache entry expired");
                None
            }
            Some(cached) if cached.revision != revision => {
                debug!(cache = self.name, key = key, "Cache entry outdated");
                None
            }
            Some(cached) => {
                debug!(cache = self.name, key = key, "Cache hit");
                Some(cached.data.clone())
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, data: T, revision: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, CachedData::new(data, revision));
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if !entries.is_empty() {
            debug!(cache = self.name, entries = entries.len(), "Cache cleared");
        }
        entries.clear();
    }

    /// Stored entries, including expired ones
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn backdate(&self, key: &str, by: Duration) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = entries.get_mut(key) {
            cached.cached_at = cached.cached_at - by;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
