use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Bounded in-memory map used only while the remote store is unreachable.
/// Entries expire lazily on read; overflow evicts the entry with the nearest
/// expiry. Process-lifetime only, never a shadow write for the remote store.
pub struct FallbackStore {
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl FallbackStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().expect("fallback store lock poisoned")
    }

    pub fn insert(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut entries = self.entries();

        // Overwrites never need an eviction; new keys at capacity push out
        // the entry closest to expiring.
        if !entries.contains_key(key) && entries.len() >= self.capacity {
            let evict = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(k, _)| k.clone());
            if let Some(evict) = evict {
                entries.remove(&evict);
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }
        // Lazy expiry: the entry outlived its TTL, drop it on the way out
        entries.remove(key);
        None
    }

    pub fn remove(&self, key: &str) {
        self.entries().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
