//! LRU Cache
//!
//! Capacity-bounded cache where each entry carries a caller-supplied charge.
//!
//! ## Responsibilities
//! - Hand out shared references (`Arc<V>`) that outlive eviction
//! - Evict least-recently-used entries once total charge exceeds capacity
//! - Return evicted values so callers can drop them outside their locks
//!
//! Not internally synchronized; wrap in a mutex to share.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

struct LruEntry<V> {
    value: Arc<V>,
    charge: usize,
    tick: u64,
}

/// Charge-based LRU cache
pub struct LruCache<K, V> {
    capacity: usize,
    usage: usize,
    tick: u64,
    entries: HashMap<K, LruEntry<V>>,
    /// Recency order: tick -> key, oldest first
    order: BTreeMap<u64, K>,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            usage: 0,
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    /// Look up `key`, marking it most recently used
    pub fn lookup(&mut self, key: &K) -> Option<Arc<V>> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.tick);
        entry.tick = tick;
        self.order.insert(tick, key.clone());
        Some(Arc::clone(&entry.value))
    }

    /// Insert `value` under `key`, replacing any previous entry
    ///
    /// Returns the cached reference and whatever was displaced or evicted.
    /// The new entry itself is never evicted by its own insertion.
    pub fn insert(&mut self, key: K, value: V, charge: usize) -> (Arc<V>, Vec<Arc<V>>) {
        let mut displaced = Vec::new();
        if let Some(old) = self.erase(&key) {
            displaced.push(old);
        }

        let tick = self.next_tick();
        let value = Arc::new(value);
        self.entries.insert(
            key.clone(),
            LruEntry {
                value: Arc::clone(&value),
                charge,
                tick,
            },
        );
        self.order.insert(tick, key.clone());
        self.usage += charge;

        while self.usage > self.capacity {
            let Some((&oldest_tick, oldest)) = self.order.first_key_value() else {
                break;
            };
            if *oldest == key {
                break;
            }
            let oldest = oldest.clone();
            self.order.remove(&oldest_tick);
            if let Some(entry) = self.entries.remove(&oldest) {
                self.usage -= entry.charge;
                displaced.push(entry.value);
            }
        }

        (value, displaced)
    }

    /// Remove `key`; outstanding references stay valid
    pub fn erase(&mut self, key: &K) -> Option<Arc<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        self.usage -= entry.charge;
        Some(entry.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_charge(&self) -> usize {
        self.usage
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}
