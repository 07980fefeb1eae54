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

use std::{future::Future, hash::BuildHasher, sync::Arc, time::Duration};

use ahash::RandomState;
use larder_common::{
    error::{Error, ErrorKind, Result},
    metrics::Metrics,
    sink::ObservabilitySink,
};
use parking_lot::Mutex;

use crate::{
    entry::CachedValue,
    inflight::{Enqueue, InflightManager, Waiter},
    key::QueryKey,
    policy::QueryPolicy,
    store::CacheStore,
};

struct CoordinatorInner<S>
where
    S: BuildHasher + Send + Sync + 'static,
{
    store: CacheStore<S>,
    inflights: Mutex<InflightManager>,
    metrics: Arc<Metrics>,
}

/// Guarantees at most one concurrent fetch per key and fans the single
/// outcome out to every caller that asked for the key while it was in
/// flight.
///
/// On success the cache store is updated, timestamped at completion, before
/// any waiter is notified; on failure the store is untouched. Either way the
/// in-flight registration is removed before notification, so a new fetch for
/// the same key can start the moment this one finishes. Coordination is
/// strictly per key.
pub struct FetchCoordinator<S = RandomState>
where
    S: BuildHasher + Send + Sync + 'static,
{
    inner: Arc<CoordinatorInner<S>>,
}

impl<S> Clone for FetchCoordinator<S>
where
    S: BuildHasher + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> FetchCoordinator<S>
where
    S: BuildHasher + Send + Sync + 'static,
{
    /// Build a coordinator over the given store.
    pub fn new(store: CacheStore<S>, metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                inflights: Mutex::new(InflightManager::new()),
                metrics,
            }),
        }
    }

    /// Run, or join, the fetch for a key.
    ///
    /// If a fetch is already pending for the key, the caller is attached as
    /// one more observer and `fetch_fn` is not invoked. Otherwise the caller
    /// leads: a fetch task is spawned that drives `fetch_fn` through the
    /// policy's retry schedule. Retries are invisible to waiters; only the
    /// terminal outcome is delivered.
    ///
    /// `sink` receives the terminal failure of a fetch that has no result
    /// consumer (prefetch); pass `None` when waiters observe failures.
    ///
    /// Must be called within a Tokio runtime.
    pub fn run<T, E, F, Fut>(
        &self,
        key: &QueryKey,
        policy: &QueryPolicy,
        weight: usize,
        fetch_fn: F,
        sink: Option<Arc<dyn ObservabilitySink>>,
    ) -> Waiter
    where
        T: Send + Sync + 'static,
        E: Into<anyhow::Error> + Send,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let enqueue = self.inner.inflights.lock().enqueue(key);
        match enqueue {
            Enqueue::Join(waiter) => {
                self.inner.metrics.fetch_join.increase(1);
                waiter
            }
            Enqueue::Lead { id, waiter } => {
                self.inner.metrics.fetch.increase(1);
                let this = self.clone();
                let key = key.clone();
                let policy = policy.clone();
                tokio::spawn(async move {
                    let outcome = execute(&key, &policy, &this.inner.metrics, fetch_fn).await;
                    this.complete(key, id, weight, policy.cache_time, outcome, sink);
                });
                waiter
            }
        }
    }

    /// Detach the pending observers of a key, if any.
    pub fn detach(&self, key: &QueryKey) -> bool {
        self.inner.inflights.lock().detach(key)
    }

    /// Detach the pending observers of every key matching the pattern.
    pub fn detach_matching(&self, pattern: &QueryKey) -> usize {
        self.inner.inflights.lock().detach_matching(pattern)
    }

    /// Detach all pending observers.
    pub fn detach_all(&self) {
        self.inner.inflights.lock().detach_all()
    }

    /// Whether a fetch is pending for the key.
    pub fn is_pending(&self, key: &QueryKey) -> bool {
        self.inner.inflights.lock().is_pending(key)
    }

    fn complete(
        &self,
        key: QueryKey,
        id: u64,
        weight: usize,
        cache_time: Duration,
        outcome: Result<CachedValue>,
        sink: Option<Arc<dyn ObservabilitySink>>,
    ) {
        match &outcome {
            Ok(value) => {
                // The store is updated even when every observer has detached;
                // store correctness must not depend on who is watching.
                self.inner.store.set(key.clone(), value.clone(), weight, cache_time);
            }
            Err(error) => {
                self.inner.metrics.fetch_failure.increase(1);
                if let Some(sink) = sink.as_ref() {
                    sink.prefetch_failed(&key.canonical(), error);
                }
            }
        }

        match self.inner.inflights.lock().take(&key, id) {
            Some(notifiers) => {
                for notifier in notifiers {
                    let _ = notifier.send(outcome.clone());
                }
            }
            None => {
                tracing::debug!(key = %key, "fetch finished after detach, result discarded");
            }
        }
    }
}

/// Drive a fetch function through the policy's retry schedule.
async fn execute<T, E, F, Fut>(key: &QueryKey, policy: &QueryPolicy, metrics: &Metrics, fetch_fn: F) -> Result<CachedValue>
where
    T: Send + Sync + 'static,
    E: Into<anyhow::Error>,
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match fetch_fn().await {
            Ok(value) => return Ok(CachedValue::new(value)),
            Err(e) => {
                let cause: anyhow::Error = e.into();
                if attempt >= policy.retry_count {
                    return Err(terminal_error(policy, attempt, key, cause));
                }
                let delay = policy.delay_for(attempt);
                tracing::debug!(key = %key, attempt, ?delay, error = %cause, "fetch attempt failed, retrying");
                metrics.fetch_retry.increase(1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn terminal_error(policy: &QueryPolicy, attempt: usize, key: &QueryKey, cause: anyhow::Error) -> Error {
    if policy.retry_count == 0 {
        Error::new(ErrorKind::FetchFailed, "fetch function failed")
            .with_context("key", key.canonical())
            .with_source(cause)
    } else {
        Error::new(ErrorKind::RetriesExhausted, "fetch function failed on every attempt")
            .with_context("key", key.canonical())
            .with_context("attempts", attempt + 1)
            .with_source(cause)
    }
}
