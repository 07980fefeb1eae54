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

//! Cache store and fetch coordination for larder.
//!
//! This crate holds the concurrency core: the bounded cache store, the
//! in-flight fetch registry that collapses concurrent requests per key, and
//! the result streams delivered to observers. The public client surface
//! lives in the `larder` crate.

mod entry;
mod fetch;
mod inflight;
mod key;
mod policy;
mod result;
mod store;
mod stream;

pub use entry::{CacheEntry, CachedValue};
pub use fetch::FetchCoordinator;
pub use inflight::{Enqueue, InflightManager, Notifier, Waiter};
pub use key::{QueryKey, KEY_DELIMITER, WILDCARD};
pub use policy::{QueryPolicy, RetryBackoff};
pub use result::{MutationResult, QueryResult};
pub use store::{CacheStore, CacheStoreConfig, StoreEventListener};
pub use stream::{MutationStream, QueryStream};
