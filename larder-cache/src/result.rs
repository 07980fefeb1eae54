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

use larder_common::error::Error;

macro_rules! impl_result_accessors {
    ($name:ident) => {
        impl<T> $name<T> {
            /// The success value, if any.
            pub fn data(&self) -> Option<&T> {
                match self {
                    Self::Success(data) => Some(data),
                    Self::Failure(_) | Self::Loading => None,
                }
            }

            /// The failure, if any.
            pub fn error(&self) -> Option<&Error> {
                match self {
                    Self::Failure(error) => Some(error),
                    Self::Success(_) | Self::Loading => None,
                }
            }

            /// Whether no terminal outcome is known yet.
            pub fn is_loading(&self) -> bool {
                matches!(self, Self::Loading)
            }

            /// Whether the operation succeeded.
            pub fn is_success(&self) -> bool {
                matches!(self, Self::Success(_))
            }

            /// Whether the operation failed.
            pub fn is_failure(&self) -> bool {
                matches!(self, Self::Failure(_))
            }

            /// Take the success value.
            pub fn into_data(self) -> Option<T> {
                match self {
                    Self::Success(data) => Some(data),
                    Self::Failure(_) | Self::Loading => None,
                }
            }

            /// Map the success value.
            pub fn map<U, F>(self, f: F) -> $name<U>
            where
                F: FnOnce(T) -> U,
            {
                match self {
                    Self::Success(data) => $name::Success(f(data)),
                    Self::Failure(error) => $name::Failure(error),
                    Self::Loading => $name::Loading,
                }
            }

            /// Chain a transform that may itself fail or still be loading.
            pub fn and_then<U, F>(self, f: F) -> $name<U>
            where
                F: FnOnce(T) -> $name<U>,
            {
                match self {
                    Self::Success(data) => f(data),
                    Self::Failure(error) => $name::Failure(error),
                    Self::Loading => $name::Loading,
                }
            }
        }
    };
}

/// Observed state of a query.
///
/// Exactly one variant is active at a time. `Loading` is emitted at most
/// once and always precedes the single terminal `Success`/`Failure`.
#[derive(Debug, Clone)]
pub enum QueryResult<T> {
    /// No terminal outcome is known yet.
    Loading,
    /// The fetch succeeded.
    Success(T),
    /// The fetch failed; retries, if any, are already exhausted.
    Failure(Error),
}

/// Observed state of a mutation.
#[derive(Debug, Clone)]
pub enum MutationResult<T> {
    /// No terminal outcome is known yet.
    Loading,
    /// The mutation succeeded.
    Success(T),
    /// The mutation failed.
    Failure(Error),
}

impl_result_accessors! { QueryResult }
impl_result_accessors! { MutationResult }

#[cfg(test)]
mod tests {
    use larder_common::error::ErrorKind;

    use super::*;

    #[test]
    fn test_accessors() {
        let success: QueryResult<u64> = QueryResult::Success(7);
        assert_eq!(success.data(), Some(&7));
        assert!(success.is_success());
        assert!(!success.is_loading());

        let failure: QueryResult<u64> = QueryResult::Failure(Error::new(ErrorKind::FetchFailed, "nope"));
        assert!(failure.is_failure());
        assert_eq!(failure.error().unwrap().kind(), ErrorKind::FetchFailed);
        assert!(failure.data().is_none());

        let loading: MutationResult<u64> = MutationResult::Loading;
        assert!(loading.is_loading());
        assert!(loading.data().is_none());
    }

    #[test]
    fn test_map_and_then() {
        let doubled = QueryResult::Success(21).map(|v: u64| v * 2);
        assert_eq!(doubled.into_data(), Some(42));

        let chained = QueryResult::Success(1u64).and_then(|v| {
            if v > 0 {
                QueryResult::Success(v + 1)
            } else {
                QueryResult::Failure(Error::new(ErrorKind::FetchFailed, "negative"))
            }
        });
        assert_eq!(chained.into_data(), Some(2));

        let still_loading: QueryResult<u64> = QueryResult::Loading;
        assert!(still_loading.map(|v| v + 1).is_loading());
    }
}
