//! Singleflight for sharing one in-flight check among concurrent requesters.

use std::hash::Hash;

use dashmap::DashMap;
use tokio::sync::broadcast;

/// Result of trying to acquire a singleflight slot.
pub enum SingleflightSlot<V> {
    /// We won the race and should run the operation, then broadcast its value.
    Leader(broadcast::Sender<V>),
    /// Another task is running it; wait for its value.
    Follower(broadcast::Receiver<V>),
}

/// Deduplicates concurrent operations that share a key.
///
/// The check-and-register step goes through DashMap's entry API, so two
/// tasks can never both become leader for the same key.
pub struct Singleflight<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    in_flight: DashMap<K, broadcast::Sender<V>>,
}

impl<K, V> Singleflight<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
        }
    }

    /// Atomically try to acquire a slot for this key.
    pub fn acquire(&self, key: K) -> SingleflightSlot<V> {
        use dashmap::mapref::entry::Entry;

        match self.in_flight.entry(key) {
            Entry::Occupied(entry) => SingleflightSlot::Follower(entry.get().subscribe()),
            Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel(1);
                entry.insert(tx.clone());
                SingleflightSlot::Leader(tx)
            }
        }
    }

    /// Remove a completed in-flight operation.
    pub fn complete(&self, key: &K) {
        self.in_flight.remove(key);
    }

    /// Number of operations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl<K, V> Default for Singleflight<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the leader's slot when dropped, including on panic or when the
/// leader's future is cancelled.
pub struct SingleflightGuard<'a, K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    singleflight: &'a Singleflight<K, V>,
    key: K,
    completed: bool,
}

impl<'a, K, V> SingleflightGuard<'a, K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(singleflight: &'a Singleflight<K, V>, key: K) -> Self {
        Self {
            singleflight,
            key,
            completed: false,
        }
    }

    /// Mark as completed (normal path).
    pub fn complete(mut self) {
        self.singleflight.complete(&self.key);
        self.completed = true;
    }
}

impl<K, V> Drop for SingleflightGuard<'_, K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn drop(&mut self) {
        if !self.completed {
            self.singleflight.complete(&self.key);
        }
    }
}
