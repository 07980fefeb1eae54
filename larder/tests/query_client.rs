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
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures_util::{future::join_all, StreamExt};
use larder::prelude::*;
use tokio::sync::Notify;

fn key(segments: &[&str]) -> QueryKey {
    QueryKey::new(segments.iter().copied()).unwrap()
}

fn no_retry_policy() -> QueryPolicy {
    QueryPolicy {
        stale_time: Duration::from_secs(300),
        cache_time: Duration::MAX,
        retry_count: 0,
        retry_delay: Duration::from_millis(100),
        retry_backoff: RetryBackoff::Fixed,
    }
}

/// Fetch function returning a fixed value and counting its invocations.
fn counted_fetch(calls: &Arc<AtomicUsize>, value: &str) -> impl Fn() -> std::future::Ready<Result<String>> + Send + Sync + 'static {
    let calls = calls.clone();
    let value = value.to_string();
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(value.clone()))
    }
}

#[test_log::test(tokio::test)]
async fn test_query_success() {
    let client = QueryClient::default();
    let k = key(&["user", "42"]);

    let results: Vec<_> = client
        .query(&k, || async { Ok::<_, anyhow::Error>("alice".to_string()) })
        .collect()
        .await;

    assert_eq!(results.len(), 2);
    assert!(results[0].is_loading());
    assert_eq!(results[1].data().unwrap(), "alice");
}

#[test_log::test(tokio::test)]
async fn test_query_failure_is_a_result_not_a_panic() {
    let client = QueryClient::builder()
        .with_default_policy(no_retry_policy())
        .build();

    let terminal = client
        .query::<String, _, _, _>(&key(&["down"]), || async { Err(anyhow::anyhow!("boom")) })
        .resolve()
        .await
        .unwrap();

    let error = terminal.error().unwrap();
    assert_eq!(error.kind(), ErrorKind::FetchFailed);
}

#[test_log::test(tokio::test)]
async fn test_fresh_hit_fetches_once() {
    let client = QueryClient::default();
    let k = key(&["user", "42"]);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = client.query(&k, counted_fetch(&calls, "alice")).resolve().await.unwrap();
    assert_eq!(first.data().unwrap(), "alice");

    // The second call falls within the stale time: served from the store,
    // no Loading, no second fetch.
    let mut stream = client.query::<String, _, _, _>(&k, counted_fetch(&calls, "alice"));
    let hit = stream.next().await.unwrap();
    assert_eq!(hit.data().unwrap(), "alice");
    assert!(stream.next().await.is_none());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test_log::test(tokio::test)]
async fn test_invalidate_forces_refetch_even_when_fresh() {
    let client = QueryClient::default();
    let k = key(&["user", "42"]);
    let calls = Arc::new(AtomicUsize::new(0));

    let _ = client.query(&k, counted_fetch(&calls, "alice")).resolve().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    client.invalidate(&k);
    assert!(!client.contains(&k));

    let again = client.query(&k, counted_fetch(&calls, "alice")).resolve().await.unwrap();
    assert_eq!(again.data().unwrap(), "alice");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test_log::test(tokio::test)]
async fn test_concurrent_queries_fetch_once() {
    let client = QueryClient::default();
    let k = key(&["user", "42"]);
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    let fetch_fn = {
        let calls = calls.clone();
        let gate = gate.clone();
        move || {
            let calls = calls.clone();
            let gate = gate.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok::<_, anyhow::Error>("alice".to_string())
            }
        }
    };

    // All callers register before any of them resolves.
    let streams: Vec<_> = (0..8).map(|_| client.query::<String, _, _, _>(&k, fetch_fn.clone())).collect();
    gate.notify_one();

    let terminals = join_all(streams.into_iter().map(|stream| stream.resolve())).await;
    for terminal in terminals {
        assert_eq!(terminal.unwrap().data().unwrap(), "alice");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let metrics = client.metrics();
    assert_eq!(metrics.fetch.get(), 1);
    assert_eq!(metrics.fetch_join.get(), 7);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_failing_fetch_runs_retry_count_plus_one_times() {
    let client = QueryClient::default();
    let calls = Arc::new(AtomicUsize::new(0));

    let fetch_fn = {
        let calls = calls.clone();
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(anyhow::anyhow!("down"))
            }
        }
    };

    let policy = QueryPolicy {
        retry_count: 3,
        retry_delay: Duration::from_millis(50),
        ..no_retry_policy()
    };
    let terminal = client
        .query_with_policy::<String, _, _, _>(&key(&["flaky"]), &policy, fetch_fn)
        .resolve()
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(terminal.error().unwrap().kind(), ErrorKind::RetriesExhausted);
    assert!(!client.contains(&key(&["flaky"])));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_stale_entry_triggers_refetch() {
    let client = QueryClient::default();
    let k = key(&["report"]);
    let calls = Arc::new(AtomicUsize::new(0));
    let policy = QueryPolicy {
        stale_time: Duration::from_secs(5),
        ..no_retry_policy()
    };

    // t = 0: fetch "A".
    let first = client
        .query_with_policy(&k, &policy, counted_fetch(&calls, "A"))
        .resolve()
        .await
        .unwrap();
    assert_eq!(first.data().unwrap(), "A");

    // t = 3s: still fresh. Cached read and query both serve "A" without a
    // fetch, and the fast path never emits Loading.
    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(client.cached::<String>(&k).unwrap(), "A");

    let mut stream = client.query::<String, _, _, _>(&k, counted_fetch(&calls, "A"));
    match stream.next().await.unwrap() {
        QueryResult::Success(value) => assert_eq!(value, "A"),
        other => panic!("expected an immediate success, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // t = 6s: age exceeds the stale time; the fetch runs again.
    tokio::time::advance(Duration::from_secs(3)).await;
    let refreshed = client
        .query_with_policy(&k, &policy, counted_fetch(&calls, "A"))
        .resolve()
        .await
        .unwrap();
    assert_eq!(refreshed.data().unwrap(), "A");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test_log::test(tokio::test)]
async fn test_pattern_invalidation() {
    let client = QueryClient::default();
    for segments in [["user", "1"], ["user", "2"], ["post", "1"]] {
        let _ = client
            .query(&key(&segments), || async { Ok::<_, anyhow::Error>(0u64) })
            .resolve()
            .await;
    }
    assert_eq!(client.len(), 3);

    client.invalidate(&key(&["user", "*"]));
    assert!(!client.contains(&key(&["user", "1"])));
    assert!(!client.contains(&key(&["user", "2"])));
    assert!(client.contains(&key(&["post", "1"])));
}

#[test_log::test(tokio::test)]
async fn test_invalidate_all() {
    let client = QueryClient::default();
    for segments in [["a"], ["b"]] {
        let _ = client
            .query(&key(&segments), || async { Ok::<_, anyhow::Error>(0u64) })
            .resolve()
            .await;
    }

    client.invalidate_all();
    assert!(client.is_empty());
    assert!(client.cached::<u64>(&key(&["a"])).is_none());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_prefetch_populates_the_store() {
    let client = QueryClient::default();
    let k = key(&["user", "42"]);
    let calls = Arc::new(AtomicUsize::new(0));

    client.prefetch(&k, counted_fetch(&calls, "alice"));
    while !client.contains(&k) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // The prefetched entry serves the next query without another fetch.
    let terminal = client.query(&k, counted_fetch(&calls, "alice")).resolve().await.unwrap();
    assert_eq!(terminal.data().unwrap(), "alice");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[derive(Clone, Default)]
struct RecordingSink {
    failures: Arc<Mutex<Vec<String>>>,
}

impl ObservabilitySink for RecordingSink {
    fn prefetch_failed(&self, key: &str, _: &Error) {
        self.failures.lock().unwrap().push(key.to_string());
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_prefetch_failure_goes_to_the_sink() {
    let sink = RecordingSink::default();
    let client = QueryClient::builder()
        .with_default_policy(no_retry_policy())
        .with_observability_sink(sink.clone())
        .build();
    let k = key(&["user", "42"]);

    client.prefetch::<String, _, _, _>(&k, || async { Err(anyhow::anyhow!("down")) });
    while sink.failures.lock().unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(sink.failures.lock().unwrap().as_slice(), &["user:42".to_string()]);
    assert!(!client.contains(&k));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_invalidation_detaches_observers_but_the_store_still_fills() {
    let client = QueryClient::default();
    let k = key(&["user", "42"]);
    let gate = Arc::new(Notify::new());

    let fetch_fn = {
        let gate = gate.clone();
        move || {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok::<_, anyhow::Error>("alice".to_string())
            }
        }
    };

    let mut stream = client.query::<String, _, _, _>(&k, fetch_fn);
    assert!(stream.next().await.unwrap().is_loading());

    client.invalidate(&k);
    gate.notify_one();

    // The detached observation ends without a terminal result.
    assert!(stream.next().await.is_none());

    // The dangling fetch still updates the store once it completes.
    while !client.contains(&k) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(client.cached::<String>(&k).unwrap(), "alice");
}

#[test_log::test(tokio::test)]
async fn test_cached_ignores_staleness_and_never_fetches() {
    let client = QueryClient::default();
    let k = key(&["user", "42"]);

    assert!(client.cached::<String>(&k).is_none());

    let policy = QueryPolicy {
        stale_time: Duration::ZERO,
        ..no_retry_policy()
    };
    let _ = client
        .query_with_policy(&k, &policy, || async { Ok::<_, anyhow::Error>("alice".to_string()) })
        .resolve()
        .await;

    // Immediately stale under the policy, still readable.
    assert_eq!(client.cached::<String>(&k).unwrap(), "alice");
}

#[test_log::test(tokio::test)]
async fn test_one_client_caches_many_value_types() {
    let client = QueryClient::default();

    let _ = client
        .query(&key(&["user", "42"]), || async { Ok::<_, anyhow::Error>("alice".to_string()) })
        .resolve()
        .await;
    let _ = client
        .query(&key(&["user", "42", "age"]), || async { Ok::<_, anyhow::Error>(33u64) })
        .resolve()
        .await;

    assert_eq!(client.cached::<String>(&key(&["user", "42"])).unwrap(), "alice");
    assert_eq!(client.cached::<u64>(&key(&["user", "42", "age"])).unwrap(), 33);
}
