//! Concurrency-safe keyed state shared by the process-wide auth structures.
//!
//! The cache, lockout guard, and session tracker all run against this trait
//! so a single-process in-memory map and an external store stay
//! interchangeable without touching call sites.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

/// Minimal keyed-store contract: get/set/remove, an atomic read-modify-write,
/// and a sweep that does not hold the lock for the full scan.
pub trait StateStore<K, V>: Send + Sync
where
    K: Clone,
    V: Clone,
{
    fn get(&self, key: &K) -> Option<V>;

    fn set(&self, key: K, value: V);

    fn remove(&self, key: &K);

    /// Atomically transform one entry. The closure receives the current value
    /// (if any); returning `None` removes the entry. The stored result is
    /// returned so callers can observe the post-mutation state in the same
    /// atomic unit (required for increment-then-check sequences).
    fn mutate(&self, key: &K, op: &mut dyn FnMut(Option<V>) -> Option<V>) -> Option<V>;

    /// Remove entries for which `keep` returns false. Candidates are collected
    /// first and re-checked on removal, so the lock is never held for a full
    /// scan-and-delete of a large map.
    fn sweep(&self, keep: &dyn Fn(&K, &V) -> bool) -> usize;

    /// Snapshot of all entries (used for eviction decisions).
    fn entries(&self) -> Vec<(K, V)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);
}

/// Mutex-guarded map, the single-process default.
#[derive(Debug)]
pub struct MemoryStore<K, V> {
    inner: Mutex<HashMap<K, V>>,
}

impl<K, V> MemoryStore<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MemoryStore<K, V>
where
    K: Eq + Hash,
{
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, V>> {
        // A poisoned lock means a panic mid-update; the map holds only
        // advisory state, so continuing with it is safe.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<K, V> StateStore<K, V> for MemoryStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: K, value: V) {
        self.lock().insert(key, value);
    }

    fn remove(&self, key: &K) {
        self.lock().remove(key);
    }

    fn mutate(&self, key: &K, op: &mut dyn FnMut(Option<V>) -> Option<V>) -> Option<V> {
        let mut map = self.lock();
        let current = map.get(key).cloned();
        match op(current) {
            Some(next) => {
                map.insert(key.clone(), next.clone());
                Some(next)
            }
            None => {
                map.remove(key);
                None
            }
        }
    }

    fn sweep(&self, keep: &dyn Fn(&K, &V) -> bool) -> usize {
        let candidates: Vec<K> = {
            let map = self.lock();
            map.iter()
                .filter(|(key, value)| !keep(key, value))
                .map(|(key, _)| key.clone())
                .collect()
        };

        let mut removed = 0;
        for key in candidates {
            let mut map = self.lock();
            // Re-check: the entry may have been refreshed since the scan.
            if map.get(&key).is_some_and(|value| !keep(&key, value)) {
                map.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.lock()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn clear(&self) {
        self.lock().clear();
    }
}
