//! # In-Memory Store
//!
//! Purpose: Hold the mock server's keys with optional expiry.
//!
//! ## Design Principles
//! 1. **TTL Fast Path**: Expiry is checked on access; there is no background
//!    expirer, so a key disappears the first time it is touched past its
//!    deadline.
//! 2. **Arc-backed Values**: Reads hand out `Arc<[u8]>` without copying.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// TTL state for a key, mirroring Redis `TTL` semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// Key is missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

#[derive(Debug)]
struct Entry {
    value: Arc<[u8]>,
    // Absolute expiration timestamp.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Vec<u8>, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<Arc<[u8]>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(Arc::clone(&entry.value)),
                Some(_) => {}
            }
        }
        self.remove_expired(key, now);
        None
    }

    /// Inserts or replaces a value. `ttl == None` clears any previous expiry.
    pub fn set(&self, key: Vec<u8>, value: Vec<u8>, ttl: Option<Duration>) {
        let entry = Entry {
            value: value.into(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.write().insert(key, entry);
    }

    /// Returns true when a live key was removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        let now = Instant::now();
        match self.entries.write().remove(key) {
            Some(entry) => !entry.is_expired(now),
            None => false,
        }
    }

    /// Sets a TTL on a live key; returns false when the key is missing.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    pub fn ttl(&self, key: &[u8]) -> TtlStatus {
        let now = Instant::now();
        let status = match self.entries.read().get(key) {
            None => return TtlStatus::Missing,
            Some(entry) if entry.is_expired(now) => TtlStatus::Missing,
            Some(entry) => match entry.expires_at {
                None => TtlStatus::NoExpiry,
                Some(deadline) => TtlStatus::ExpiresIn(deadline - now),
            },
        };
        if status == TtlStatus::Missing {
            self.remove_expired(key, now);
        }
        status
    }

    /// Number of stored entries, including expired ones not yet touched.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_expired(&self, key: &[u8], now: Instant) {
        let mut entries = self.entries.write();
        // Re-check under the write lock; a concurrent SET may have revived it.
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn set_and_get() {
        let store = MemoryStore::new();
        store.set(b"alpha".to_vec(), b"one".to_vec(), None);
        assert_eq!(store.get(b"alpha").as_deref(), Some(&b"one"[..]));
        assert_eq!(store.ttl(b"alpha"), TtlStatus::NoExpiry);
        assert!(store.get(b"missing").is_none());
    }

    #[test]
    fn expiry_hides_and_removes_value() {
        let store = MemoryStore::new();
        store.set(b"alpha".to_vec(), b"one".to_vec(), Some(Duration::from_millis(1)));
        thread::sleep(Duration::from_millis(5));
        assert!(store.get(b"alpha").is_none());
        assert_eq!(store.ttl(b"alpha"), TtlStatus::Missing);
        assert!(store.is_empty());
    }

    #[test]
    fn set_without_ttl_clears_expiry() {
        let store = MemoryStore::new();
        store.set(b"alpha".to_vec(), b"one".to_vec(), Some(Duration::from_secs(10)));
        assert!(matches!(store.ttl(b"alpha"), TtlStatus::ExpiresIn(_)));
        store.set(b"alpha".to_vec(), b"two".to_vec(), None);
        assert_eq!(store.ttl(b"alpha"), TtlStatus::NoExpiry);
    }

    #[test]
    fn expire_and_delete() {
        let store = MemoryStore::new();
        assert!(!store.expire(b"alpha", Duration::from_secs(1)));
        store.set(b"alpha".to_vec(), b"one".to_vec(), None);
        assert!(store.expire(b"alpha", Duration::from_secs(30)));
        match store.ttl(b"alpha") {
            TtlStatus::ExpiresIn(left) => assert!(left <= Duration::from_secs(30)),
            other => panic!("unexpected ttl {other:?}"),
        }
        assert!(store.delete(b"alpha"));
        assert!(!store.delete(b"alpha"));
    }
}
