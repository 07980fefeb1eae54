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

use hashbrown::{hash_map::Entry as HashMapEntry, HashMap};
use larder_common::error::Result;
use tokio::sync::oneshot;

use crate::{entry::CachedValue, key::QueryKey};

/// Sender half handed to the fetch task to deliver the outcome to one waiter.
pub type Notifier = oneshot::Sender<Result<CachedValue>>;
/// Receiver half handed to a caller waiting on a pending fetch.
pub type Waiter = oneshot::Receiver<Result<CachedValue>>;

/// Outcome of registering interest in a key's fetch.
pub enum Enqueue {
    /// No fetch was pending; the caller must run the fetch function and is
    /// handed the registration id to complete with.
    Lead {
        /// Registration id, required by [`InflightManager::take`].
        id: u64,
        /// The leader's own waiter.
        waiter: Waiter,
    },
    /// A fetch was already pending; the caller is attached as one more
    /// observer of its outcome and must not invoke the fetch function.
    Join(Waiter),
}

struct PendingFetch {
    id: u64,
    notifiers: Vec<Notifier>,
}

/// Registry of in-flight fetches, at most one per key.
///
/// The registry is the single point that collapses concurrent requests for
/// one key into one underlying fetch. A registration is removed before its
/// waiters are notified, so a new fetch for the same key can start the
/// moment the previous one finishes.
///
/// Registration ids guard against stale completions: a fetch detached by
/// invalidation must not steal the registration a newer fetch put in place
/// for the same key.
pub struct InflightManager {
    pendings: HashMap<QueryKey, PendingFetch>,
    next_id: u64,
}

impl Default for InflightManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InflightManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            pendings: HashMap::new(),
            next_id: 0,
        }
    }

    /// Register interest in the fetch for a key.
    pub fn enqueue(&mut self, key: &QueryKey) -> Enqueue {
        let (tx, rx) = oneshot::channel();
        match self.pendings.entry(key.clone()) {
            HashMapEntry::Vacant(v) => {
                self.next_id += 1;
                let id = self.next_id;
                v.insert(PendingFetch {
                    id,
                    notifiers: vec![tx],
                });
                Enqueue::Lead { id, waiter: rx }
            }
            HashMapEntry::Occupied(mut o) => {
                o.get_mut().notifiers.push(tx);
                Enqueue::Join(rx)
            }
        }
    }

    /// Remove the registration for a key iff it still belongs to `id`, and
    /// return its notifiers for fan-out.
    ///
    /// Returns `None` when the registration was detached or superseded; the
    /// completing fetch then has nobody to notify.
    pub fn take(&mut self, key: &QueryKey, id: u64) -> Option<Vec<Notifier>> {
        if !self.pendings.get(key).is_some_and(|pending| pending.id == id) {
            return None;
        }
        let pending = self.pendings.remove(key).expect("pending fetch vanished under the lock");
        Some(pending.notifiers)
    }

    /// Drop the registration for a key without delivering anything.
    ///
    /// The waiters' channels close, ending their observation; the fetch task
    /// itself keeps running and its eventual completion finds no
    /// registration to fan out to.
    pub fn detach(&mut self, key: &QueryKey) -> bool {
        self.pendings.remove(key).is_some()
    }

    /// Drop every registration whose key matches the pattern.
    pub fn detach_matching(&mut self, pattern: &QueryKey) -> usize {
        let before = self.pendings.len();
        self.pendings.retain(|key, _| !key.matches(pattern));
        before - self.pendings.len()
    }

    /// Drop all registrations.
    pub fn detach_all(&mut self) {
        self.pendings.clear();
    }

    /// Whether a fetch is pending for the key.
    pub fn is_pending(&self, key: &QueryKey) -> bool {
        self.pendings.contains_key(key)
    }
}
