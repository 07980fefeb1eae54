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

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How retry delays grow across attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryBackoff {
    /// Every retry waits the base delay.
    Fixed,
    /// Retry `n` waits `(n + 1) *` the base delay.
    Linear,
    /// Retry `n` waits `2^n *` the base delay.
    Exponential,
}

/// Timing and retry parameters governing one query.
///
/// A policy is immutable configuration: supplied per call or defaulted per
/// client, never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPolicy {
    /// Age after which cached data is considered stale and triggers a refetch.
    pub stale_time: Duration,
    /// How long an entry may remain in the store unused before it becomes
    /// eligible for eviction.
    pub cache_time: Duration,
    /// Fetch retries on failure, on top of the initial attempt.
    pub retry_count: usize,
    /// Base delay between retries, scaled by [`QueryPolicy::retry_backoff`].
    pub retry_delay: Duration,
    /// How retry delays grow across attempts.
    pub retry_backoff: RetryBackoff,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            cache_time: Duration::from_secs(10 * 60),
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            retry_backoff: RetryBackoff::Exponential,
        }
    }
}

impl QueryPolicy {
    /// Preset for real-time data: 30s stale time, 60s cache time, 2 retries.
    pub fn fast() -> Self {
        Self {
            stale_time: Duration::from_secs(30),
            cache_time: Duration::from_secs(60),
            retry_count: 2,
            retry_delay: Duration::from_millis(500),
            retry_backoff: RetryBackoff::Exponential,
        }
    }

    /// Preset for static data: 30min stale time, 1h cache time, 5 retries.
    pub fn slow() -> Self {
        Self {
            stale_time: Duration::from_secs(30 * 60),
            cache_time: Duration::from_secs(60 * 60),
            retry_count: 5,
            retry_delay: Duration::from_secs(2),
            retry_backoff: RetryBackoff::Exponential,
        }
    }

    /// Preset for data that rarely changes: never stale, never expires.
    pub fn infinite() -> Self {
        Self {
            stale_time: Duration::MAX,
            cache_time: Duration::MAX,
            retry_count: 1,
            retry_delay: Duration::from_secs(1),
            retry_backoff: RetryBackoff::Exponential,
        }
    }

    /// The delay to sleep before retry `attempt` (zero-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        match self.retry_backoff {
            RetryBackoff::Fixed => self.retry_delay,
            RetryBackoff::Linear => {
                let factor = attempt.saturating_add(1).min(u32::MAX as usize) as u32;
                self.retry_delay.saturating_mul(factor)
            }
            RetryBackoff::Exponential => {
                let factor = 1u32.checked_shl(attempt.min(31) as u32).unwrap_or(u32::MAX);
                self.retry_delay.saturating_mul(factor)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(QueryPolicy::fast().stale_time, Duration::from_secs(30));
        assert_eq!(QueryPolicy::slow().cache_time, Duration::from_secs(3600));
        assert_eq!(QueryPolicy::infinite().stale_time, Duration::MAX);
        assert_eq!(QueryPolicy::infinite().retry_count, 1);
        assert_eq!(QueryPolicy::default().retry_count, 3);
    }

    #[test]
    fn test_delay_schedules() {
        let base = Duration::from_millis(100);

        let fixed = QueryPolicy {
            retry_delay: base,
            retry_backoff: RetryBackoff::Fixed,
            ..QueryPolicy::default()
        };
        assert_eq!(fixed.delay_for(0), base);
        assert_eq!(fixed.delay_for(5), base);

        let linear = QueryPolicy {
            retry_backoff: RetryBackoff::Linear,
            ..fixed.clone()
        };
        assert_eq!(linear.delay_for(0), base);
        assert_eq!(linear.delay_for(2), base * 3);

        let exponential = QueryPolicy {
            retry_backoff: RetryBackoff::Exponential,
            ..fixed
        };
        assert_eq!(exponential.delay_for(0), base);
        assert_eq!(exponential.delay_for(3), base * 8);
    }

    #[test]
    fn test_delay_saturates() {
        let policy = QueryPolicy {
            retry_delay: Duration::MAX,
            retry_backoff: RetryBackoff::Exponential,
            ..QueryPolicy::default()
        };
        assert_eq!(policy.delay_for(40), Duration::MAX);
    }
}
