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

use std::{future::Future, hash::BuildHasher, sync::Arc};

use ahash::RandomState;
use hashbrown::HashMap;
use larder_cache::{CachedValue, MutationStream, Notifier, QueryKey};
use larder_common::error::{Error, ErrorKind, Result};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::client::QueryClient;

struct MutationRegistration {
    id: u64,
    notifier: Notifier,
}

#[derive(Default)]
struct MutationRegistry {
    entries: HashMap<QueryKey, MutationRegistration>,
    next_id: u64,
}

struct MutationInner<S>
where
    S: BuildHasher + Send + Sync + 'static,
{
    queries: QueryClient<S>,
    registrations: Mutex<MutationRegistry>,
}

/// The mutation engine: one-shot writes with success-time invalidation.
///
/// Unlike queries, mutations are never deduplicated: every call executes
/// its mutation function exactly once. Observation is last-writer-wins per
/// mutation key: a new call under a key detaches the previous call's
/// observer. The superseded operation keeps running, but its result is
/// discarded, including its invalidation step.
///
/// `MutationClient` is a cheaply cloneable handle.
pub struct MutationClient<S = RandomState>
where
    S: BuildHasher + Send + Sync + 'static,
{
    inner: Arc<MutationInner<S>>,
}

impl<S> Clone for MutationClient<S>
where
    S: BuildHasher + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> MutationClient<S>
where
    S: BuildHasher + Send + Sync + 'static,
{
    /// Create a mutation client over the given query client.
    pub fn new(queries: QueryClient<S>) -> Self {
        Self {
            inner: Arc::new(MutationInner {
                queries,
                registrations: Mutex::new(MutationRegistry::default()),
            }),
        }
    }

    /// The query client mutations invalidate through.
    pub fn queries(&self) -> &QueryClient<S> {
        &self.inner.queries
    }

    /// Run a mutation.
    ///
    /// The stream yields `Loading`, then the terminal `Success`/`Failure`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn mutate<R, E, F, Fut>(&self, key: &QueryKey, mutation_fn: F) -> MutationStream<R>
    where
        R: Clone + Send + Sync + 'static,
        E: Into<anyhow::Error>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        self.mutate_inner(key, Vec::new(), mutation_fn)
    }

    /// Run a mutation that takes a single input value.
    pub fn mutate_with<I, R, E, F, Fut>(&self, key: &QueryKey, input: I, mutation_fn: F) -> MutationStream<R>
    where
        I: Send + 'static,
        R: Clone + Send + Sync + 'static,
        E: Into<anyhow::Error>,
        F: FnOnce(I) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        self.mutate_inner(key, Vec::new(), move || mutation_fn(input))
    }

    /// Run a mutation and, on success, invalidate the given query keys
    /// (exact or pattern) before the success result is delivered, so a
    /// query re-run from a success handler sees already-invalidated state.
    pub fn mutate_and_invalidate<R, E, F, Fut>(
        &self,
        key: &QueryKey,
        mutation_fn: F,
        invalidate_keys: Vec<QueryKey>,
    ) -> MutationStream<R>
    where
        R: Clone + Send + Sync + 'static,
        E: Into<anyhow::Error>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        self.mutate_inner(key, invalidate_keys, mutation_fn)
    }

    /// Detach the observer of the mutation pending under a key, if any.
    ///
    /// The in-flight operation is not aborted; its result is discarded.
    pub fn cancel(&self, key: &QueryKey) -> bool {
        self.inner.registrations.lock().entries.remove(key).is_some()
    }

    /// Detach the observers of all pending mutations.
    pub fn cancel_all(&self) {
        self.inner.registrations.lock().entries.clear();
    }

    fn mutate_inner<R, E, F, Fut>(&self, key: &QueryKey, invalidate_keys: Vec<QueryKey>, mutation_fn: F) -> MutationStream<R>
    where
        R: Clone + Send + Sync + 'static,
        E: Into<anyhow::Error>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let id = {
            let mut registry = self.inner.registrations.lock();
            registry.next_id += 1;
            let id = registry.next_id;
            // Last-writer-wins: replacing a previous registration drops its
            // notifier and closes that observer's stream.
            registry
                .entries
                .insert(key.clone(), MutationRegistration { id, notifier: tx });
            id
        };

        let this = self.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let outcome = match mutation_fn().await {
                Ok(value) => Ok(CachedValue::new(value)),
                Err(e) => Err(Error::new(ErrorKind::MutationFailed, "mutation function failed")
                    .with_context("key", key.canonical())
                    .with_source(e)),
            };
            this.complete(key, id, invalidate_keys, outcome);
        });

        MutationStream::pending(rx)
    }

    fn complete(&self, key: QueryKey, id: u64, invalidate_keys: Vec<QueryKey>, outcome: Result<CachedValue>) {
        let registration = {
            let mut registry = self.inner.registrations.lock();
            if registry.entries.get(&key).is_some_and(|registration| registration.id == id) {
                registry.entries.remove(&key)
            } else {
                None
            }
        };

        let Some(registration) = registration else {
            tracing::debug!(key = %key, "mutation superseded or cancelled, result discarded");
            return;
        };

        if outcome.is_ok() {
            for invalidate_key in invalidate_keys.iter() {
                self.inner.queries.invalidate(invalidate_key);
            }
        }
        let _ = registration.notifier.send(outcome);
    }
}
