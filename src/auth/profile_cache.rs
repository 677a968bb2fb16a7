//! Process-wide memoization of account-profile lookups.
//!
//! Not a correctness boundary: a miss just means another backing-store fetch.
//! Entries are never promoted on hit (approximate FIFO, not LRU) and are
//! never updated in place; profile mutations call `invalidate`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::kv::{MemoryStore, StateStore};
use super::types::{AccountId, Profile};

#[derive(Clone, Debug)]
struct CacheEntry {
    profile: Profile,
    inserted_at: Instant,
}

pub struct ProfileCache {
    store: Arc<dyn StateStore<AccountId, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl ProfileCache {
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), ttl, capacity)
    }

    fn with_store(
        store: Arc<dyn StateStore<AccountId, CacheEntry>>,
        ttl: Duration,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Fetch a profile if present and fresh. Stale entries are dropped and
    /// reported as a miss so the caller refetches.
    #[must_use]
    pub fn get(&self, account_id: &AccountId) -> Option<Profile> {
        let entry = self.store.get(account_id)?;
        if entry.inserted_at.elapsed() > self.ttl {
            self.store.remove(account_id);
            return None;
        }
        Some(entry.profile)
    }

    pub fn insert(&self, profile: Profile) {
        self.store.set(
            profile.account_id.clone(),
            CacheEntry {
                profile,
                inserted_at: Instant::now(),
            },
        );
        if self.store.len() > self.capacity {
            self.evict_oldest();
        }
    }

    /// Called after a profile mutation elsewhere in the system.
    pub fn invalidate(&self, account_id: &AccountId) {
        self.store.remove(account_id);
    }

    /// Administrative/test use.
    pub fn clear(&self) {
        self.store.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Drop the oldest-inserted ~10% of entries (at least one).
    fn evict_oldest(&self) {
        let mut entries = self.store.entries();
        entries.sort_by_key(|(_, entry)| entry.inserted_at);
        let batch = (self.capacity / 10).max(1);
        for (account_id, _) in entries.into_iter().take(batch) {
            self.store.remove(&account_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(account_id: &str) -> Profile {
        Profile {
            account_id: account_id.to_string(),
            email: format!("{account_id}@example.com"),
            display_name: account_id.to_string(),
            is_admin: false,
        }
    }

    #[test]
    fn hit_within_ttl() {
        let cache = ProfileCache::new(Duration::from_secs(60), 10);
        cache.insert(profile("acc-1"));
        assert_eq!(cache.get(&"acc-1".to_string()), Some(profile("acc-1")));
    }

    #[test]
    fn expired_entry_is_a_miss_and_removed() {
        let cache = ProfileCache::new(Duration::from_millis(10), 10);
        cache.insert(profile("acc-1"));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"acc-1".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_forces_miss() {
        let cache = ProfileCache::new(Duration::from_secs(60), 10);
        cache.insert(profile("acc-1"));
        cache.invalidate(&"acc-1".to_string());
        assert_eq!(cache.get(&"acc-1".to_string()), None);
    }

    #[test]
    fn clear_empties_cache() {
        let cache = ProfileCache::new(Duration::from_secs(60), 10);
        cache.insert(profile("acc-1"));
        cache.insert(profile("acc-2"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_overflow_evicts_oldest_batch() {
        let cache = ProfileCache::new(Duration::from_secs(60), 20);
        for index in 0..21 {
            cache.insert(profile(&format!("acc-{index:02}")));
            // Distinct insertion instants so eviction order is deterministic.
            std::thread::sleep(Duration::from_millis(1));
        }
        // 20 / 10 = 2 oldest entries evicted on overflow.
        assert_eq!(cache.len(), 19);
        assert_eq!(cache.get(&"acc-00".to_string()), None);
        assert_eq!(cache.get(&"acc-01".to_string()), None);
        assert!(cache.get(&"acc-20".to_string()).is_some());
    }

    #[test]
    fn eviction_is_insertion_ordered_not_usage_ordered() {
        let cache = ProfileCache::new(Duration::from_secs(60), 10);
        for index in 0..10 {
            cache.insert(profile(&format!("acc-{index}")));
            std::thread::sleep(Duration::from_millis(1));
        }
        // Repeated hits must not promote the oldest entry.
        for _ in 0..5 {
            assert!(cache.get(&"acc-0".to_string()).is_some());
        }
        cache.insert(profile("acc-new"));
        assert_eq!(cache.get(&"acc-0".to_string()), None);
    }
}
