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

use std::{
    any::Any,
    fmt::Debug,
    sync::Arc,
    time::Duration,
};

use tokio::time::Instant;

/// Type-erased cached value.
///
/// The store holds values of arbitrary types under string-segment keys, so
/// values are erased to `Arc<dyn Any>` with the concrete type name retained
/// for diagnostics. One key maps to one fixed value type for its lifetime;
/// downcasting an entry to a different type is a caller bug and panics.
#[derive(Clone)]
pub struct CachedValue {
    data: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Debug for CachedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedValue").field("type", &self.type_name).finish()
    }
}

impl CachedValue {
    /// Erase a value.
    pub fn new<T>(value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self {
            data: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The type name of the erased value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Recover the value as `T`.
    ///
    /// # Panics
    ///
    /// Panics if the entry was stored as a different type. Mixing value types
    /// under one key is a programming error, not a recoverable condition.
    pub fn downcast<T>(&self) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        match self.data.downcast_ref::<T>() {
            Some(value) => value.clone(),
            None => panic!(
                "cache entry stored as `{}` accessed as `{}`; one key maps to one value type",
                self.type_name,
                std::any::type_name::<T>(),
            ),
        }
    }
}

/// A cached value and the instant it was stored.
///
/// Entries are owned by the cache store; lookups hand out copies (the value
/// itself is shared behind an `Arc`). Staleness is derived from the stored
/// instant, never stored: an entry is stale once its age exceeds the stale
/// time of the policy the caller supplied.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: CachedValue,
    stored_at: Instant,
}

impl CacheEntry {
    /// Create an entry stamped now.
    pub fn new(value: CachedValue) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
        }
    }

    pub(crate) fn from_parts(value: CachedValue, stored_at: Instant) -> Self {
        Self { value, stored_at }
    }

    /// The stored value.
    pub fn value(&self) -> &CachedValue {
        &self.value
    }

    /// Take the stored value.
    pub fn into_value(self) -> CachedValue {
        self.value
    }

    /// The instant the value was stored.
    pub fn stored_at(&self) -> Instant {
        self.stored_at
    }

    /// The entry's age.
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// Whether the entry's age exceeds the given stale time.
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        self.age() > stale_time
    }
}
