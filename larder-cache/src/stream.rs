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
    fmt::Debug,
    future::{poll_fn, Future},
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

use futures_core::Stream;
use larder_common::error::Error;

use crate::{
    entry::CachedValue,
    inflight::Waiter,
    result::{MutationResult, QueryResult},
};

enum ObservationState {
    /// Fresh cache hit; the value is yielded once, then the stream ends.
    Hit(Option<CachedValue>),
    /// Waiting on a pending operation; `Loading` is yielded first.
    Pending { loading_emitted: bool, waiter: Waiter },
    Done,
}

impl Debug for ObservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hit(value) => f.debug_tuple("Hit").field(value).finish(),
            Self::Pending { loading_emitted, .. } => f
                .debug_struct("Pending")
                .field("loading_emitted", loading_emitted)
                .finish(),
            Self::Done => f.debug_struct("Done").finish(),
        }
    }
}

impl ObservationState {
    /// Poll for the next event, or `None` when the observation is over.
    ///
    /// A closed waiter channel means the observation was detached by
    /// invalidation or supersession: the stream ends without a terminal
    /// event, and the in-flight operation's result goes to the store (or
    /// nowhere), not to this observer.
    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<ObservationEvent>> {
        loop {
            match self {
                Self::Hit(value) => {
                    if let Some(value) = value.take() {
                        return Poll::Ready(Some(ObservationEvent::Success(value)));
                    }
                    *self = Self::Done;
                }
                Self::Pending { loading_emitted, waiter } => {
                    if !*loading_emitted {
                        *loading_emitted = true;
                        return Poll::Ready(Some(ObservationEvent::Loading));
                    }
                    match Pin::new(waiter).poll(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Ok(Ok(value))) => {
                            *self = Self::Done;
                            return Poll::Ready(Some(ObservationEvent::Success(value)));
                        }
                        Poll::Ready(Ok(Err(error))) => {
                            *self = Self::Done;
                            return Poll::Ready(Some(ObservationEvent::Failure(error)));
                        }
                        Poll::Ready(Err(_)) => {
                            *self = Self::Done;
                            return Poll::Ready(None);
                        }
                    }
                }
                Self::Done => return Poll::Ready(None),
            }
        }
    }
}

enum ObservationEvent {
    Loading,
    Success(CachedValue),
    Failure(Error),
}

/// Stream of [`QueryResult`]s for one query call.
///
/// Yields either `Success` alone (fresh cache hit) or `Loading` followed by
/// one terminal `Success`/`Failure`. Ends without a terminal event when the
/// observation is detached by invalidation.
#[derive(Debug)]
#[must_use = "streams do nothing unless polled"]
pub struct QueryStream<T> {
    state: ObservationState,
    _marker: PhantomData<fn() -> T>,
}

impl<T> QueryStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Stream over a fresh cache hit.
    #[doc(hidden)]
    pub fn hit(value: CachedValue) -> Self {
        Self {
            state: ObservationState::Hit(Some(value)),
            _marker: PhantomData,
        }
    }

    /// Stream over a pending fetch.
    #[doc(hidden)]
    pub fn pending(waiter: Waiter) -> Self {
        Self {
            state: ObservationState::Pending {
                loading_emitted: false,
                waiter,
            },
            _marker: PhantomData,
        }
    }

    /// Drive the stream to its terminal result, skipping `Loading`.
    ///
    /// Returns `None` when the observation was detached before a terminal
    /// result arrived.
    pub async fn resolve(mut self) -> Option<QueryResult<T>> {
        loop {
            match poll_fn(|cx| Pin::new(&mut self).poll_next(cx)).await {
                Some(QueryResult::Loading) => continue,
                other => return other,
            }
        }
    }
}

impl<T> Stream for QueryStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = QueryResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().state.poll_event(cx).map(|event| {
            event.map(|event| match event {
                ObservationEvent::Loading => QueryResult::Loading,
                ObservationEvent::Success(value) => QueryResult::Success(value.downcast::<T>()),
                ObservationEvent::Failure(error) => QueryResult::Failure(error),
            })
        })
    }
}

/// Stream of [`MutationResult`]s for one mutation call.
///
/// Always yields `Loading` first, then one terminal `Success`/`Failure`.
/// Ends without a terminal event when a newer mutation under the same key
/// superseded this observation, or it was cancelled.
#[derive(Debug)]
#[must_use = "streams do nothing unless polled"]
pub struct MutationStream<T> {
    state: ObservationState,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MutationStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Stream over a pending mutation.
    #[doc(hidden)]
    pub fn pending(waiter: Waiter) -> Self {
        Self {
            state: ObservationState::Pending {
                loading_emitted: false,
                waiter,
            },
            _marker: PhantomData,
        }
    }

    /// Drive the stream to its terminal result, skipping `Loading`.
    ///
    /// Returns `None` when the observation was superseded or cancelled.
    pub async fn resolve(mut self) -> Option<MutationResult<T>> {
        loop {
            match poll_fn(|cx| Pin::new(&mut self).poll_next(cx)).await {
                Some(MutationResult::Loading) => continue,
                other => return other,
            }
        }
    }
}

impl<T> Stream for MutationStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = MutationResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().state.poll_event(cx).map(|event| {
            event.map(|event| match event {
                ObservationEvent::Loading => MutationResult::Loading,
                ObservationEvent::Success(value) => MutationResult::Success(value.downcast::<T>()),
                ObservationEvent::Failure(error) => MutationResult::Failure(error),
            })
        })
    }
}
