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

use std::{future::Future, hash::BuildHasher, mem, sync::Arc};

use ahash::RandomState;
use larder_cache::{
    CacheStore, CacheStoreConfig, FetchCoordinator, QueryKey, QueryPolicy, QueryStream, StoreEventListener,
};
use larder_common::{
    metrics::Metrics,
    sink::{ObservabilitySink, TracingSink},
};

/// Builder for [`QueryClient`].
pub struct QueryClientBuilder<S = RandomState>
where
    S: BuildHasher + Send + Sync + 'static,
{
    max_entries: usize,
    max_cost: usize,
    shards: usize,
    default_policy: QueryPolicy,
    event_listener: Option<Arc<StoreEventListener>>,
    sink: Arc<dyn ObservabilitySink>,
    hash_builder: S,
}

impl Default for QueryClientBuilder<RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClientBuilder<RandomState> {
    /// Create a builder with the default configuration: 100 entries,
    /// 50 MiB aggregate cost, 8 shards.
    pub fn new() -> Self {
        Self {
            max_entries: 100,
            max_cost: 50 * 1024 * 1024,
            shards: 8,
            default_policy: QueryPolicy::default(),
            event_listener: None,
            sink: Arc::new(TracingSink),
            hash_builder: RandomState::default(),
        }
    }
}

impl<S> QueryClientBuilder<S>
where
    S: BuildHasher + Send + Sync + 'static,
{
    /// Set the maximum entry count of the cache store.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the maximum aggregate entry cost of the cache store, in bytes.
    pub fn with_max_cost(mut self, max_cost: usize) -> Self {
        self.max_cost = max_cost;
        self
    }

    /// Set the cache store shard count. Entries are distributed to shards by
    /// key hash; operations on different shards can be parallelized.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Set the policy used by calls that do not supply one.
    pub fn with_default_policy(mut self, policy: QueryPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Set a listener over entries leaving the cache store.
    pub fn with_event_listener(mut self, event_listener: Arc<StoreEventListener>) -> Self {
        self.event_listener = Some(event_listener);
        self
    }

    /// Set the sink that receives prefetch failures.
    pub fn with_observability_sink(mut self, sink: impl ObservabilitySink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Set the hasher used for shard selection.
    pub fn with_hash_builder<OS>(self, hash_builder: OS) -> QueryClientBuilder<OS>
    where
        OS: BuildHasher + Send + Sync + 'static,
    {
        QueryClientBuilder {
            max_entries: self.max_entries,
            max_cost: self.max_cost,
            shards: self.shards,
            default_policy: self.default_policy,
            event_listener: self.event_listener,
            sink: self.sink,
            hash_builder,
        }
    }

    /// Build the client.
    pub fn build(self) -> QueryClient<S> {
        let metrics = Arc::new(Metrics::default());
        let store = CacheStore::new(CacheStoreConfig {
            max_entries: self.max_entries,
            max_cost: self.max_cost,
            shards: self.shards,
            hash_builder: self.hash_builder,
            event_listener: self.event_listener,
            metrics: metrics.clone(),
        });
        let coordinator = FetchCoordinator::new(store.clone(), metrics.clone());
        QueryClient {
            inner: Arc::new(ClientInner {
                store,
                coordinator,
                default_policy: self.default_policy,
                sink: self.sink,
                metrics,
            }),
        }
    }
}

struct ClientInner<S>
where
    S: BuildHasher + Send + Sync + 'static,
{
    store: CacheStore<S>,
    coordinator: FetchCoordinator<S>,
    default_policy: QueryPolicy,
    sink: Arc<dyn ObservabilitySink>,
    metrics: Arc<Metrics>,
}

/// The query engine: cached reads, deduplicated fetches, invalidation.
///
/// `QueryClient` is a cheaply cloneable handle; clones share one cache store
/// and one in-flight fetch registry.
///
/// A query returns the cached value immediately while it is fresh under the
/// call's policy; otherwise the fetch function runs (or an already pending
/// fetch for the same key is joined) and the outcome is streamed to every
/// observer. Fetch errors are always delivered as `Failure` results, never
/// raised out of the public API.
pub struct QueryClient<S = RandomState>
where
    S: BuildHasher + Send + Sync + 'static,
{
    inner: Arc<ClientInner<S>>,
}

impl Default for QueryClient<RandomState> {
    fn default() -> Self {
        QueryClientBuilder::new().build()
    }
}

impl QueryClient<RandomState> {
    /// Create a builder with the default configuration.
    pub fn builder() -> QueryClientBuilder<RandomState> {
        QueryClientBuilder::new()
    }
}

impl<S> Clone for QueryClient<S>
where
    S: BuildHasher + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> QueryClient<S>
where
    S: BuildHasher + Send + Sync + 'static,
{
    /// Query a key with the client's default policy.
    ///
    /// See [`QueryClient::query_with_policy`].
    pub fn query<T, E, F, Fut>(&self, key: &QueryKey, fetch_fn: F) -> QueryStream<T>
    where
        T: Clone + Send + Sync + 'static,
        E: Into<anyhow::Error> + Send,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        self.query_with_policy(key, &self.inner.default_policy, fetch_fn)
    }

    /// Query a key.
    ///
    /// If a cached entry exists and is fresh under `policy.stale_time`, the
    /// stream yields `Success` immediately and ends; the fetch function is
    /// not invoked. Otherwise the stream yields `Loading` followed by the
    /// terminal outcome of the fetch, either the caller's own or one already
    /// in flight for the same key.
    ///
    /// Must be called within a Tokio runtime.
    pub fn query_with_policy<T, E, F, Fut>(&self, key: &QueryKey, policy: &QueryPolicy, fetch_fn: F) -> QueryStream<T>
    where
        T: Clone + Send + Sync + 'static,
        E: Into<anyhow::Error> + Send,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        if let Some(entry) = self.inner.store.get(key) {
            if !entry.is_stale(policy.stale_time) {
                return QueryStream::hit(entry.into_value());
            }
            self.inner.metrics.stale.increase(1);
        }

        let waiter = self
            .inner
            .coordinator
            .run(key, policy, mem::size_of::<T>(), fetch_fn, None);
        QueryStream::pending(waiter)
    }

    /// Prefetch a key with the client's default policy.
    pub fn prefetch<T, E, F, Fut>(&self, key: &QueryKey, fetch_fn: F)
    where
        T: Send + Sync + 'static,
        E: Into<anyhow::Error> + Send,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        self.prefetch_with_policy(key, &self.inner.default_policy, fetch_fn)
    }

    /// Run a fetch in the background purely to populate the cache store.
    ///
    /// Fire-and-forget: there is no result consumer. A fetch already pending
    /// for the key is joined rather than duplicated. Failures are reported
    /// to the observability sink and nowhere else.
    pub fn prefetch_with_policy<T, E, F, Fut>(&self, key: &QueryKey, policy: &QueryPolicy, fetch_fn: F)
    where
        T: Send + Sync + 'static,
        E: Into<anyhow::Error> + Send,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let _ = self.inner.coordinator.run(
            key,
            policy,
            mem::size_of::<T>(),
            fetch_fn,
            Some(self.inner.sink.clone()),
        );
    }

    /// Invalidate a key: remove its cache store entry and detach observers
    /// of its pending fetch, if any. A pattern key invalidates every match.
    ///
    /// The next `query` for an invalidated key is guaranteed to bypass the
    /// fresh-cache fast path. An in-flight fetch is not aborted; its result
    /// is discarded for the detached observers, though a successful one
    /// still lands in the store.
    pub fn invalidate(&self, key: &QueryKey) {
        if key.is_pattern() {
            self.inner.store.remove_matching(key);
            self.inner.coordinator.detach_matching(key);
        } else {
            self.inner.store.remove(key);
            self.inner.coordinator.detach(key);
        }
    }

    /// Invalidate everything: clear the cache store and detach all pending
    /// observers.
    pub fn invalidate_all(&self) {
        self.inner.store.clear();
        self.inner.coordinator.detach_all();
    }

    /// The cached value for a key, regardless of staleness.
    ///
    /// Synchronous and read-only; never triggers a fetch.
    pub fn cached<T>(&self, key: &QueryKey) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.inner.store.peek(key).map(|entry| entry.value().downcast::<T>())
    }

    /// Whether the store holds an entry for the key, regardless of staleness.
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.store.contains(key)
    }

    /// The entry count of the cache store.
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    /// Whether the cache store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// The aggregate entry cost of the cache store, in bytes.
    pub fn cost(&self) -> usize {
        self.inner.store.cost()
    }

    /// The policy used by calls that do not supply one.
    pub fn default_policy(&self) -> &QueryPolicy {
        &self.inner.default_policy
    }

    /// Activity counters.
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }
}
