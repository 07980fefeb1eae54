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

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter.
///
/// Counters are observability data, not synchronization points; all accesses
/// are relaxed.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Increase the counter by the given delta.
    pub fn increase(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    /// Read the current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters for cache and fetch activity.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Store lookups that found an entry.
    pub hit: Counter,
    /// Store lookups that found nothing.
    pub miss: Counter,
    /// Queries that found an entry past its stale time.
    pub stale: Counter,

    /// Fetches led by a caller after a miss or a stale hit.
    pub fetch: Counter,
    /// Callers that joined an already pending fetch instead of leading one.
    pub fetch_join: Counter,
    /// Fetch attempts retried after a failure.
    pub fetch_retry: Counter,
    /// Fetches that surfaced a terminal failure.
    pub fetch_failure: Counter,

    /// Successful inserts without replaces.
    pub insert: Counter,
    /// Successful replaces.
    pub replace: Counter,
    /// Successful removes.
    pub remove: Counter,
    /// Evicts caused by capacity pressure.
    pub evict: Counter,
    /// Entries dropped after sitting unused past their cache time.
    pub expire: Counter,
}
