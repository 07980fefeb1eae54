// Copyright 2026 larder Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{collections::BTreeMap, hash::BuildHasher, sync::Arc, time::Duration};

use ahash::RandomState;
use hashbrown::HashMap;
use itertools::Itertools;
use larder_common::{
    event::{Event, EventListener},
    metrics::Metrics,
};
use parking_lot::RwLock;
use tokio::time::Instant;

use crate::{
    entry::{CacheEntry, CachedValue},
    key::QueryKey,
};

/// Listener over entries leaving the store, specialized to store types.
pub type StoreEventListener = dyn EventListener<Key = QueryKey, Value = CachedValue>;

/// Configuration for [`CacheStore`].
pub struct CacheStoreConfig<S = RandomState>
where
    S: BuildHasher + Send + Sync + 'static,
{
    /// Maximum entry count across the store.
    pub max_entries: usize,
    /// Maximum aggregate entry cost across the store, in bytes.
    pub max_cost: usize,
    /// Shard count; bounds are split across shards.
    pub shards: usize,
    /// Hasher for shard selection.
    pub hash_builder: S,
    /// Observer of entries leaving the store.
    pub event_listener: Option<Arc<StoreEventListener>>,
    /// Activity counters.
    pub metrics: Arc<Metrics>,
}

struct StoreSlot {
    value: CachedValue,
    stored_at: Instant,
    last_access: Instant,
    cache_time: Duration,
    weight: usize,
    tick: u64,
}

struct StoreShard {
    slots: HashMap<QueryKey, StoreSlot>,
    /// Access order, oldest tick first. Every slot owns exactly one tick.
    recency: BTreeMap<u64, QueryKey>,
    tick: u64,
    cost: usize,

    max_entries: usize,
    max_cost: usize,

    metrics: Arc<Metrics>,
}

type Garbage = (Event, QueryKey, CachedValue);

impl StoreShard {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn get(&mut self, key: &QueryKey) -> Option<CacheEntry> {
        let now = Instant::now();
        let tick = self.next_tick();

        let slot = match self.slots.get_mut(key) {
            Some(slot) => {
                self.metrics.hit.increase(1);
                slot
            }
            None => {
                self.metrics.miss.increase(1);
                return None;
            }
        };

        let old_tick = slot.tick;
        slot.tick = tick;
        slot.last_access = now;
        let entry = CacheEntry::from_parts(slot.value.clone(), slot.stored_at);

        let moved = self.recency.remove(&old_tick);
        debug_assert!(moved.is_some(), "slot without a recency tick");
        self.recency.insert(tick, key.clone());

        Some(entry)
    }

    fn peek(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.slots
            .get(key)
            .map(|slot| CacheEntry::from_parts(slot.value.clone(), slot.stored_at))
    }

    fn insert(&mut self, key: QueryKey, value: CachedValue, weight: usize, cache_time: Duration, garbages: &mut Vec<Garbage>) {
        let now = Instant::now();
        let tick = self.next_tick();

        if let Some(old) = self.slots.remove(&key) {
            self.recency.remove(&old.tick);
            self.cost -= old.weight;
            self.metrics.replace.increase(1);
            garbages.push((Event::Replace, key.clone(), old.value));
        } else {
            self.metrics.insert.increase(1);
        }

        self.slots.insert(
            key.clone(),
            StoreSlot {
                value,
                stored_at: now,
                last_access: now,
                cache_time,
                weight,
                tick,
            },
        );
        self.recency.insert(tick, key.clone());
        self.cost += weight;

        self.reclaim(&key, now, garbages);
    }

    /// Drop entries in access order, oldest first, while a bound is exceeded
    /// or the oldest entry sat unused past its cache time. The entry just
    /// inserted is never a victim of its own insertion.
    fn reclaim(&mut self, protected: &QueryKey, now: Instant, garbages: &mut Vec<Garbage>) {
        loop {
            let (tick, key) = match self.recency.iter().next() {
                Some((tick, key)) => (*tick, key),
                None => break,
            };
            if key == protected {
                break;
            }

            let slot = self.slots.get(key).expect("recency tick without a slot");
            let expired = now.duration_since(slot.last_access) > slot.cache_time;
            let over = self.slots.len() > self.max_entries || self.cost > self.max_cost;
            if !expired && !over {
                break;
            }

            let key = key.clone();
            self.recency.remove(&tick);
            let slot = self.slots.remove(&key).expect("slot vanished during reclaim");
            self.cost -= slot.weight;

            let event = if expired { Event::Expire } else { Event::Evict };
            match event {
                Event::Expire => self.metrics.expire.increase(1),
                _ => self.metrics.evict.increase(1),
            }
            garbages.push((event, key, slot.value));
        }
    }

    fn remove(&mut self, key: &QueryKey, garbages: &mut Vec<Garbage>) -> bool {
        match self.slots.remove(key) {
            Some(slot) => {
                self.recency.remove(&slot.tick);
                self.cost -= slot.weight;
                self.metrics.remove.increase(1);
                garbages.push((Event::Remove, key.clone(), slot.value));
                true
            }
            None => false,
        }
    }

    fn remove_matching(&mut self, pattern: &QueryKey, garbages: &mut Vec<Garbage>) -> usize {
        let victims = self
            .slots
            .keys()
            .filter(|key| key.matches(pattern))
            .cloned()
            .collect_vec();
        for key in victims.iter() {
            self.remove(key, garbages);
        }
        victims.len()
    }

    fn clear(&mut self, garbages: &mut Vec<Garbage>) {
        let mut count = 0;
        for (key, slot) in self.slots.drain() {
            count += 1;
            garbages.push((Event::Clear, key, slot.value));
        }
        self.recency.clear();
        self.cost = 0;
        self.metrics.remove.increase(count);
    }
}

struct StoreInner<S>
where
    S: BuildHasher + Send + Sync + 'static,
{
    shards: Vec<RwLock<StoreShard>>,
    hash_builder: S,
    event_listener: Option<Arc<StoreEventListener>>,
}

/// Bounded mapping from [`QueryKey`] to cached entries.
///
/// Entries are distributed over shards by key hash; each bound is split
/// across shards. Within a shard, entries leave in least-recently-used order
/// once a bound is exceeded, and entries that sat unused past their cache
/// time are dropped opportunistically on writes.
///
/// All mutating operations are atomic with respect to each other: writers
/// are serialized per shard while readers proceed concurrently.
pub struct CacheStore<S = RandomState>
where
    S: BuildHasher + Send + Sync + 'static,
{
    inner: Arc<StoreInner<S>>,
}

impl<S> Clone for CacheStore<S>
where
    S: BuildHasher + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> CacheStore<S>
where
    S: BuildHasher + Send + Sync + 'static,
{
    /// Build a store with the given configuration.
    pub fn new(config: CacheStoreConfig<S>) -> Self {
        assert!(config.shards > 0, "shards must be greater than zero.");

        let shards = (0..config.shards)
            .map(|index| StoreShard {
                slots: HashMap::new(),
                recency: BTreeMap::new(),
                tick: 0,
                cost: 0,
                max_entries: Self::split_for(config.max_entries, config.shards, index),
                max_cost: Self::split_for(config.max_cost, config.shards, index),
                metrics: config.metrics.clone(),
            })
            .map(RwLock::new)
            .collect_vec();

        Self {
            inner: Arc::new(StoreInner {
                shards,
                hash_builder: config.hash_builder,
                event_listener: config.event_listener,
            }),
        }
    }

    /// Look up an entry, refreshing its recency.
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.inner.shards[self.shard(key)].write().get(key)
    }

    /// Look up an entry without side effects.
    pub fn peek(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.inner.shards[self.shard(key)].read().peek(key)
    }

    /// Whether an entry exists for the key, regardless of staleness.
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.shards[self.shard(key)].read().slots.contains_key(key)
    }

    /// Insert or overwrite the entry for a key, then reclaim over-bound and
    /// expired entries. The inserted entry is never reclaimed by its own
    /// insertion.
    pub fn set(&self, key: QueryKey, value: CachedValue, weight: usize, cache_time: Duration) {
        let mut garbages = vec![];
        self.inner.shards[self.shard(&key)]
            .write()
            .insert(key, value, weight, cache_time, &mut garbages);
        self.notify(garbages);
    }

    /// Remove the entry for a key. Removing an absent key is a no-op.
    pub fn remove(&self, key: &QueryKey) -> bool {
        let mut garbages = vec![];
        let removed = self.inner.shards[self.shard(key)].write().remove(key, &mut garbages);
        self.notify(garbages);
        removed
    }

    /// Remove every entry whose key matches the pattern. Returns the count.
    pub fn remove_matching(&self, pattern: &QueryKey) -> usize {
        let mut garbages = vec![];
        let mut removed = 0;
        for shard in self.inner.shards.iter() {
            removed += shard.write().remove_matching(pattern, &mut garbages);
        }
        self.notify(garbages);
        removed
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let mut garbages = vec![];
        for shard in self.inner.shards.iter() {
            shard.write().clear(&mut garbages);
        }
        self.notify(garbages);
    }

    /// The entry count across all shards.
    pub fn len(&self) -> usize {
        self.inner.shards.iter().map(|shard| shard.read().slots.len()).sum()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The aggregate entry cost across all shards.
    pub fn cost(&self) -> usize {
        self.inner.shards.iter().map(|shard| shard.read().cost).sum()
    }

    fn shard(&self, key: &QueryKey) -> usize {
        self.inner.hash_builder.hash_one(key) as usize % self.inner.shards.len()
    }

    /// Deliver listener callbacks outside the shard lock critical sections.
    fn notify(&self, garbages: Vec<Garbage>) {
        if let Some(listener) = self.inner.event_listener.as_ref() {
            for (event, key, value) in garbages {
                listener.on_leave(event, &key, &value);
            }
        }
    }

    fn split_for(total: usize, shards: usize, index: usize) -> usize {
        let base = total / shards;
        let remainder = total % shards;
        base + usize::from(index < remainder)
    }
}
