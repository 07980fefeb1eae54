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
        Arc,
    },
    time::Duration,
};

use futures_util::StreamExt;
use larder::prelude::*;
use tokio::sync::Notify;

fn key(segments: &[&str]) -> QueryKey {
    QueryKey::new(segments.iter().copied()).unwrap()
}

async fn populate(client: &QueryClient, k: &QueryKey, value: u64) {
    let _ = client
        .query(k, move || async move { Ok::<_, anyhow::Error>(value) })
        .resolve()
        .await;
    assert!(client.contains(k));
}

#[test_log::test(tokio::test)]
async fn test_mutate_streams_loading_then_success() {
    let mutations = MutationClient::new(QueryClient::default());

    let mut stream = mutations.mutate(&key(&["create-post"]), || async {
        Ok::<_, anyhow::Error>("post-7".to_string())
    });

    assert!(stream.next().await.unwrap().is_loading());
    match stream.next().await.unwrap() {
        MutationResult::Success(id) => assert_eq!(id, "post-7"),
        other => panic!("expected success, got {other:?}"),
    }
    assert!(stream.next().await.is_none());
}

#[test_log::test(tokio::test)]
async fn test_mutate_failure_is_a_result() {
    let mutations = MutationClient::new(QueryClient::default());

    let terminal = mutations
        .mutate::<String, _, _, _>(&key(&["create-post"]), || async { Err(anyhow::anyhow!("rejected")) })
        .resolve()
        .await
        .unwrap();

    assert_eq!(terminal.error().unwrap().kind(), ErrorKind::MutationFailed);
}

#[test_log::test(tokio::test)]
async fn test_mutate_with_input() {
    let mutations = MutationClient::new(QueryClient::default());

    let terminal = mutations
        .mutate_with(&key(&["rename-user"]), "bob".to_string(), |name| async move {
            Ok::<_, anyhow::Error>(format!("renamed to {name}"))
        })
        .resolve()
        .await
        .unwrap();

    assert_eq!(terminal.into_data().unwrap(), "renamed to bob");
}

#[test_log::test(tokio::test)]
async fn test_success_invalidates_before_the_caller_observes_it() {
    let client = QueryClient::default();
    let mutations = MutationClient::new(client.clone());

    let k1 = key(&["user", "1"]);
    let k2 = key(&["user", "2"]);
    populate(&client, &k1, 1).await;
    populate(&client, &k2, 2).await;

    let terminal = mutations
        .mutate_and_invalidate(
            &key(&["update-users"]),
            || async { Ok::<_, anyhow::Error>(()) },
            vec![k1.clone(), k2.clone()],
        )
        .resolve()
        .await
        .unwrap();

    // By the time success is observable, both keys are gone.
    assert!(terminal.is_success());
    assert!(!client.contains(&k1));
    assert!(!client.contains(&k2));
}

#[test_log::test(tokio::test)]
async fn test_pattern_invalidation_on_success() {
    let client = QueryClient::default();
    let mutations = MutationClient::new(client.clone());

    populate(&client, &key(&["user", "1"]), 1).await;
    populate(&client, &key(&["user", "2"]), 2).await;
    populate(&client, &key(&["post", "1"]), 3).await;

    let _ = mutations
        .mutate_and_invalidate(
            &key(&["update-users"]),
            || async { Ok::<_, anyhow::Error>(()) },
            vec![key(&["user", "*"])],
        )
        .resolve()
        .await;

    assert!(!client.contains(&key(&["user", "1"])));
    assert!(!client.contains(&key(&["user", "2"])));
    assert!(client.contains(&key(&["post", "1"])));
}

#[test_log::test(tokio::test)]
async fn test_failure_does_not_invalidate() {
    let client = QueryClient::default();
    let mutations = MutationClient::new(client.clone());
    let k = key(&["user", "1"]);
    populate(&client, &k, 1).await;

    let terminal = mutations
        .mutate_and_invalidate::<String, _, _, _>(
            &key(&["update-user"]),
            || async { Err(anyhow::anyhow!("rejected")) },
            vec![k.clone()],
        )
        .resolve()
        .await
        .unwrap();

    assert!(terminal.is_failure());
    assert!(client.contains(&k));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_last_writer_wins_per_mutation_key() {
    let client = QueryClient::default();
    let mutations = MutationClient::new(client.clone());
    let mutation_key = key(&["update-user"]);
    let watched = key(&["user", "1"]);
    populate(&client, &watched, 1).await;

    let first_gate = Arc::new(Notify::new());
    let mut first = mutations.mutate_and_invalidate(
        &mutation_key,
        {
            let first_gate = first_gate.clone();
            move || async move {
                first_gate.notified().await;
                Ok::<_, anyhow::Error>("first".to_string())
            }
        },
        vec![watched.clone()],
    );
    assert!(first.next().await.unwrap().is_loading());

    // The second call under the same key supersedes the first observation.
    let second = mutations.mutate(&mutation_key, || async { Ok::<_, anyhow::Error>("second".to_string()) });

    // The first operation completes, but nobody observes it: no terminal
    // event, and its invalidation step is skipped.
    first_gate.notify_one();
    assert!(first.next().await.is_none());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.contains(&watched));

    let terminal = second.resolve().await.unwrap();
    assert_eq!(terminal.into_data().unwrap(), "second");
}

#[test_log::test(tokio::test)]
async fn test_cancel_detaches_the_observer() {
    let mutations = MutationClient::new(QueryClient::default());
    let mutation_key = key(&["slow-write"]);
    let gate = Arc::new(Notify::new());

    let mut stream = mutations.mutate(&mutation_key, {
        let gate = gate.clone();
        move || async move {
            gate.notified().await;
            Ok::<_, anyhow::Error>(())
        }
    });
    assert!(stream.next().await.unwrap().is_loading());

    assert!(mutations.cancel(&mutation_key));
    assert!(!mutations.cancel(&mutation_key));
    gate.notify_one();

    assert!(stream.next().await.is_none());
}

#[test_log::test(tokio::test)]
async fn test_mutations_are_never_deduplicated() {
    let mutations = MutationClient::new(QueryClient::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let mutation_fn = {
        let calls = calls.clone();
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            }
        }
    };

    let first = mutations.mutate(&key(&["write"]), mutation_fn.clone()).resolve().await;
    let second = mutations.mutate(&key(&["write"]), mutation_fn).resolve().await;

    assert!(first.unwrap().is_success());
    assert!(second.unwrap().is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
