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

use crate::error::Error;

/// Sink for failures that cannot be delivered to an observer.
///
/// Prefetches have no result consumer, so their failures are routed here
/// instead of being surfaced through a result stream.
pub trait ObservabilitySink: Send + Sync + 'static {
    /// Called when a background prefetch fails after exhausting its retries.
    ///
    /// `key` is the canonical form of the prefetched key.
    #[expect(unused_variables)]
    fn prefetch_failed(&self, key: &str, error: &Error) {}
}

/// Default sink that reports failures as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn prefetch_failed(&self, key: &str, error: &Error) {
        tracing::warn!(key, %error, "prefetch failed");
    }
}
