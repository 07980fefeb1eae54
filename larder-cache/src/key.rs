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

use std::fmt::{self, Display};

use larder_common::error::{Error, ErrorKind, Result};

/// Delimiter between segments in the canonical key form.
pub const KEY_DELIMITER: char = ':';

/// Segment that matches any value when the key is used as a pattern.
pub const WILDCARD: &str = "*";

/// Canonical identifier for a cached value, built from ordered string segments.
///
/// Equality and hashing are structural, by segment sequence. The canonical
/// string form joins segments with [`KEY_DELIMITER`] and round-trips through
/// [`QueryKey::parse`] for non-wildcard keys.
///
/// A key whose segments contain [`WILDCARD`] is a match pattern, usable for
/// bulk invalidation but never stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    segments: Vec<String>,
}

impl QueryKey {
    /// Build a key from ordered segments.
    ///
    /// Rejects an empty segment sequence, empty segments, and segments that
    /// contain the canonical delimiter, so that the canonical form stays
    /// unambiguous.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(Error::new(ErrorKind::InvalidKey, "key must have at least one segment"));
        }
        for segment in segments.iter() {
            if segment.is_empty() {
                return Err(Error::new(ErrorKind::InvalidKey, "key segment must not be empty"));
            }
            if segment.contains(KEY_DELIMITER) {
                return Err(Error::new(ErrorKind::InvalidKey, "key segment must not contain the delimiter")
                    .with_context("segment", segment));
            }
        }
        Ok(Self { segments })
    }

    /// Build a key from segments already known to be well-formed.
    ///
    /// Only for use by builders that construct segments themselves.
    pub(crate) fn from_valid_segments(segments: Vec<String>) -> Self {
        debug_assert!(!segments.is_empty());
        Self { segments }
    }

    /// Parse a key from its canonical string form.
    pub fn parse(canonical: &str) -> Result<Self> {
        Self::new(canonical.split(KEY_DELIMITER))
    }

    /// The canonical string form, segments joined by [`KEY_DELIMITER`].
    pub fn canonical(&self) -> String {
        self.segments.join(&KEY_DELIMITER.to_string())
    }

    /// The ordered segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the key has no segments. Always false for a constructed key.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The segment at the given position, if any.
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    /// A new key with one more segment appended.
    pub fn appending(&self, segment: impl Into<String>) -> Result<Self> {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self::new(segments)
    }

    /// Whether any segment is the wildcard, making this key a match pattern.
    pub fn is_pattern(&self) -> bool {
        self.segments.iter().any(|segment| segment == WILDCARD)
    }

    /// Whether this key matches the given pattern.
    ///
    /// True iff segment counts are equal and every pattern segment is either
    /// the wildcard or equal to the corresponding segment of this key. There
    /// is no prefix or partial-length matching.
    pub fn matches(&self, pattern: &QueryKey) -> bool {
        if self.segments.len() != pattern.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(pattern.segments.iter())
            .all(|(segment, pattern)| pattern == WILDCARD || segment == pattern)
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}
