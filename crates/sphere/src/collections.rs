// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A generic sharded concurrent map.
//!
//! Ported from the original implementation's per-type `ConcurrentMap`
//! family (`channel_map.go`, `connection_map.go`, `channel_model_map.go`,
//! `map_eventmodel.go` — four copies of the same 32-shard FNV-hashed
//! `RWMutex`-guarded map, one per value type). Collapsed into a single
//! generic type, per the design doc's re-architecture note: one data
//! structure, instantiated for each element type the engine needs
//! (connections, channels, and the two namespace-model registries).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

/// Default shard count (spec §6).
pub const DEFAULT_SHARDS: usize = 32;

struct Shard<V> {
    items: RwLock<HashMap<String, V>>,
}

/// A string-keyed map split across `N` independently-locked shards so
/// concurrent readers and writers on different keys never contend on the
/// same lock.
pub struct ShardedMap<V> {
    shards: Vec<Shard<V>>,
}

impl<V> Default for ShardedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ShardedMap<V> {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| Shard { items: RwLock::new(HashMap::new()) }).collect(),
        }
    }

    fn shard_for(&self, key: &str) -> &Shard<V> {
        &self.shards[fnv1a(key) as usize % self.shards.len()]
    }

    fn lock_read(&self, key: &str) -> std::sync::RwLockReadGuard<'_, HashMap<String, V>> {
        match self.shard_for(key).items.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_write(&self, key: &str) -> std::sync::RwLockWriteGuard<'_, HashMap<String, V>> {
        match self.shard_for(key).items.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<V: Clone> ShardedMap<V> {
    /// Insert or overwrite the value for `key`.
    pub fn set(&self, key: &str, value: V) {
        self.lock_write(key).insert(key.to_owned(), value);
    }

    /// Insert `value` only if `key` is currently absent. Returns `true` if
    /// the insert happened.
    pub fn set_if_absent(&self, key: &str, value: V) -> bool {
        let mut shard = self.lock_write(key);
        if shard.contains_key(key) {
            false
        } else {
            shard.insert(key.to_owned(), value);
            true
        }
    }

    /// Insert `value` only if absent, atomically returning the entry that
    /// ends up stored (either the existing one or the one just inserted).
    /// Avoids a separate get-after-set-if-absent race on the resubscribe path.
    pub fn get_or_insert_with(&self, key: &str, make: impl FnOnce() -> V) -> V {
        let mut shard = self.lock_write(key);
        shard.entry(key.to_owned()).or_insert_with(make).clone()
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.lock_read(key).get(key).cloned()
    }
}

impl<V> ShardedMap<V> {
    pub fn has(&self, key: &str) -> bool {
        self.lock_read(key).contains_key(key)
    }

    /// Remove `key`. Returns the removed value, if any.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.lock_write(key).remove(key)
    }

    /// Remove `key` only if `predicate` holds for its current value, without
    /// releasing the shard lock between the check and the removal. Used by
    /// channel teardown to avoid a separate read-then-write race against a
    /// concurrent resubscribe.
    pub fn remove_if(&self, key: &str, predicate: impl FnOnce(&V) -> bool) -> bool {
        let mut shard = self.lock_write(key);
        match shard.get(key) {
            Some(v) if predicate(v) => {
                shard.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| match s.items.read() {
            Ok(g) => g.len(),
            Err(p) => p.into_inner().len(),
        }).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> ShardedMap<V> {
    /// A weakly-consistent snapshot of `(key, value)` pairs: no entry is
    /// yielded twice, and every yielded entry was present in its shard at
    /// the moment it was read, but entries inserted mid-iteration may or
    /// may not appear (spec §4.2).
    pub fn iter(&self) -> Vec<(String, V)> {
        let mut out = Vec::with_capacity(self.len());
        for shard in &self.shards {
            let guard = match shard.items.read() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            out.extend(guard.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        out
    }
}

/// FNV-1a hash, matching the original's `hash/fnv` shard-selection scheme.
fn fnv1a(key: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    key.bytes().fold(OFFSET_BASIS, |hash, byte| (hash ^ byte as u32).wrapping_mul(PRIME))
}

/// An `Arc`-wrapped shorthand used throughout the engine, since every map
/// here holds reference-counted, independently-cloneable handles.
pub type SharedMap<V> = Arc<ShardedMap<V>>;
