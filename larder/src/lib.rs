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

//! larder - async data-fetching cache for Rust.
//!
//! Given a deterministic key and an async fetch function, larder returns
//! cached data while it is fresh, transparently refetches when it is stale,
//! collapses concurrent fetches for the same key into one, and streams the
//! outcome to every observer. A companion mutation client performs write
//! operations and invalidates dependent cache entries on success.
//!
//! # Example
//!
//! ```
//! use larder::prelude::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let client = QueryClient::default();
//!     let key = QueryKey::new(["user", "42"]).unwrap();
//!
//!     let result = client
//!         .query(&key, || async { Ok::<_, anyhow::Error>("alice".to_string()) })
//!         .resolve()
//!         .await
//!         .unwrap();
//!     assert_eq!(result.into_data().unwrap(), "alice");
//!
//!     // Fresh data is served from the store without another fetch.
//!     assert_eq!(client.cached::<String>(&key).unwrap(), "alice");
//!
//!     // Writes invalidate what they touch.
//!     let mutations = MutationClient::new(client.clone());
//!     let key_pattern = QueryKey::new(["user", "*"]).unwrap();
//!     let _ = mutations
//!         .mutate_and_invalidate(
//!             &QueryKey::new(["rename-user"]).unwrap(),
//!             || async { Ok::<_, anyhow::Error>(()) },
//!             vec![key_pattern],
//!         )
//!         .resolve()
//!         .await;
//!     assert!(client.cached::<String>(&key).is_none());
//! }
//! ```

mod client;
mod mutation;

/// Conventional key builders.
pub mod keys;
/// The prelude of the larder crate.
pub mod prelude;

pub use client::{QueryClient, QueryClientBuilder};
pub use larder_cache as cache;
pub use larder_common as common;
pub use mutation::MutationClient;
