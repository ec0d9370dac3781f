//! Thread-safe handle registry for listeners and watchers
//!
//! Provides numeric handles for values registered from several threads at
//! once. The event bus hands these out as listener ids.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe registry mapping numeric handles to values.
///
/// Handles are auto-incrementing u64 IDs and are never reused.
pub struct HandleRegistry<T> {
    map: DashMap<u64, T>,
    next_id: AtomicU64,
}

impl<T> HandleRegistry<T> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Insert a value and return its handle.
    pub fn insert(&self, value: T) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.map.insert(id, value);
        id
    }

    /// Remove a value by handle, returning it.
    pub fn remove(&self, id: u64) -> Option<T> {
        self.map.remove(&id).map(|(_, value)| value)
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the registry holds no values.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Remove every value, returning them.
    pub fn drain(&self) -> Vec<T> {
        let ids: Vec<u64> = self.map.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }
}

impl<T: Clone> HandleRegistry<T> {
    /// Clone out every value in handle order.
    ///
    /// No shard lock is held once this returns, so callers may invoke the
    /// values even if that re-enters the registry.
    pub fn snapshot(&self) -> Vec<(u64, T)> {
        let mut values: Vec<(u64, T)> = self
            .map
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        values.sort_by_key(|(id, _)| *id);
        values
    }
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
