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

//! Conventional key builders.
//!
//! Pure helpers that assemble [`QueryKey`]s for common entity shapes:
//! entity name plus id, or entity name plus a filter map rendered as sorted
//! `k=v` pairs joined by commas. Construction fails with
//! `ErrorKind::InvalidKey` if an id or filter would produce a malformed key.

use std::collections::BTreeMap;

use larder_cache::QueryKey;
use larder_common::error::Result;

/// Key for a single user.
pub fn user(user_id: impl AsRef<str>) -> Result<QueryKey> {
    QueryKey::new(["user", user_id.as_ref()])
}

/// Key for a filtered user listing.
pub fn users<K, V>(filters: impl IntoIterator<Item = (K, V)>) -> Result<QueryKey>
where
    K: Into<String>,
    V: Into<String>,
{
    filtered("users", filters)
}

/// Key for a single post.
pub fn post(post_id: impl AsRef<str>) -> Result<QueryKey> {
    QueryKey::new(["post", post_id.as_ref()])
}

/// Key for a filtered post listing.
pub fn posts<K, V>(filters: impl IntoIterator<Item = (K, V)>) -> Result<QueryKey>
where
    K: Into<String>,
    V: Into<String>,
{
    filtered("posts", filters)
}

/// Key for the comments of a post.
pub fn comments(post_id: impl AsRef<str>) -> Result<QueryKey> {
    QueryKey::new(["comments", post_id.as_ref()])
}

/// Key for notifications, optionally scoped to a user.
pub fn notifications(user_id: Option<&str>) -> Result<QueryKey> {
    match user_id {
        Some(user_id) => QueryKey::new(["notifications", user_id]),
        None => QueryKey::new(["notifications"]),
    }
}

/// Key for a user's settings.
pub fn settings(user_id: impl AsRef<str>) -> Result<QueryKey> {
    QueryKey::new(["settings", user_id.as_ref()])
}

/// Key for a search, optionally narrowed by filters.
pub fn search<K, V>(query: impl AsRef<str>, filters: impl IntoIterator<Item = (K, V)>) -> Result<QueryKey>
where
    K: Into<String>,
    V: Into<String>,
{
    let mut segments = vec!["search".to_string(), query.as_ref().to_string()];
    if let Some(rendered) = render_filters(filters) {
        segments.push(rendered);
    }
    QueryKey::new(segments)
}

fn filtered<K, V>(name: &str, filters: impl IntoIterator<Item = (K, V)>) -> Result<QueryKey>
where
    K: Into<String>,
    V: Into<String>,
{
    match render_filters(filters) {
        Some(rendered) => QueryKey::new([name.to_string(), rendered]),
        None => QueryKey::new([name]),
    }
}

/// Render a filter map as sorted `k=v` pairs joined by commas, or `None`
/// when there are no filters.
fn render_filters<K, V>(filters: impl IntoIterator<Item = (K, V)>) -> Option<String>
where
    K: Into<String>,
    V: Into<String>,
{
    let sorted: BTreeMap<String, String> = filters.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
    if sorted.is_empty() {
        return None;
    }
    let rendered = sorted
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    Some(rendered)
}
