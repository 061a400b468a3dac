//! Server-side TLS session cache.
//!
//! Shared by every connection on the TLS listener. Sized by session count
//! (derived from the configured megabytes) and expires entries after the
//! session timeout.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rustls::server::StoresServerSessions;

/// Sessions stored per megabyte of configured cache.
pub const SESSIONS_PER_MB: usize = 4_000;

#[derive(Debug)]
struct CachedSession {
    value: Vec<u8>,
    stored_at: Instant,
}

/// Bounded, expiring session store.
#[derive(Debug)]
pub struct SessionCache {
    entries: DashMap<Vec<u8>, CachedSession>,
    capacity: usize,
    ttl: Duration,
}

impl SessionCache {
    /// Create a cache holding at most `capacity` sessions for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            ttl,
        }
    }

    /// Create a cache from a size in megabytes.
    pub fn with_megabytes(megabytes: usize, ttl: Duration) -> Self {
        Self::new(megabytes.saturating_mul(SESSIONS_PER_MB), ttl)
    }

    /// Maximum number of sessions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored sessions, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, session: &CachedSession, now: Instant) -> bool {
        now.saturating_duration_since(session.stored_at) >= self.ttl
    }

    pub(crate) fn put_at(&self, key: Vec<u8>, value: Vec<u8>, now: Instant) -> bool {
        if self.capacity == 0 {
            return false;
        }

        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.entries.retain(|_, session| !self.is_expired(session, now));
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }

        self.entries.insert(
            key,
            CachedSession {
                value,
                stored_at: now,
            },
        );
        true
    }

    pub(crate) fn get_at(&self, key: &[u8], now: Instant) -> Option<Vec<u8>> {
        if let Some(entry) = self.entries.get(key) {
            if !self.is_expired(&entry, now) {
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }
        // The read guard is released before removing the expired entry.
        self.entries.remove(key);
        None
    }

    pub(crate) fn take_at(&self, key: &[u8], now: Instant) -> Option<Vec<u8>> {
        let (_, session) = self.entries.remove(key)?;
        if self.is_expired(&session, now) {
            return None;
        }
        Some(session.value)
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().stored_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

impl StoresServerSessions for SessionCache {
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> bool {
        self.put_at(key, value, Instant::now())
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.get_at(key, Instant::now())
    }

    fn take(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.take_at(key, Instant::now())
    }

    fn can_cache(&self) -> bool {
        self.capacity > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_expires_sessions() {
        let cache = SessionCache::new(10, Duration::from_secs(60));
        let t = Instant::now();

        assert!(cache.put_at(b"id".to_vec(), b"state".to_vec(), t));
        assert_eq!(cache.get_at(b"id", t + Duration::from_secs(59)), Some(b"state".to_vec()));
        assert_eq!(cache.get_at(b"id", t + Duration::from_secs(60)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn take_removes_session() {
        let cache = SessionCache::new(10, Duration::from_secs(60));
        let t = Instant::now();

        cache.put_at(b"id".to_vec(), b"state".to_vec(), t);
        assert_eq!(cache.take_at(b"id", t), Some(b"state".to_vec()));
        assert_eq!(cache.take_at(b"id", t), None);
    }

    #[test]
    fn full_cache_evicts_oldest() {
        let cache = SessionCache::new(2, Duration::from_secs(60));
        let t = Instant::now();

        cache.put_at(b"a".to_vec(), b"1".to_vec(), t);
        cache.put_at(b"b".to_vec(), b"2".to_vec(), t + Duration::from_secs(1));
        cache.put_at(b"c".to_vec(), b"3".to_vec(), t + Duration::from_secs(2));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_at(b"a", t + Duration::from_secs(2)), None);
        assert!(cache.get_at(b"c", t + Duration::from_secs(2)).is_some());
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = SessionCache::with_megabytes(0, Duration::from_secs(60));
        assert!(!cache.can_cache());
        assert!(!cache.put(b"id".to_vec(), b"state".to_vec()));
    }

    #[test]
    fn capacity_from_megabytes() {
        let cache = SessionCache::with_megabytes(50, Duration::from_secs(86_400));
        assert_eq!(cache.capacity(), 200_000);
    }
}
