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

//! Shared components for the larder crates.

/// Error types for the larder crates.
pub mod error;
/// Cache entry lifecycle events and listener.
pub mod event;
/// Counters for cache and fetch activity.
pub mod metrics;
/// Sink for failures that have no observer to deliver to.
pub mod sink;
