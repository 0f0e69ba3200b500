// Copyright 2025-Present BeaconKit authors
// SPDX-License-Identifier: Apache-2.0

use crate::error::Error;
use std::time::Duration;

/// Default maximum record age: 1 hour 45 minutes.
pub const DEFAULT_MAX_RECORD_AGE: Duration = Duration::from_millis(6_300_000);
/// Default lower cache size bound: 80 MiB.
pub const DEFAULT_LOWER_SIZE_BOUND: u64 = 80 * 1024 * 1024;
/// Default upper cache size bound: 100 MiB.
pub const DEFAULT_UPPER_SIZE_BOUND: u64 = 100 * 1024 * 1024;

/// Age- and size-based bounds governing when buffered beacon records become
/// eligible for eviction.
///
/// The two size bounds form an eviction band: once the cache grows past the
/// upper bound, records are evicted until it falls below the lower bound.
/// Set once at startup; the collector cannot override these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    max_record_age: Duration,
    lower_size_bound: u64,
    upper_size_bound: u64,
}

impl RetentionPolicy {
    pub fn new(
        max_record_age: Duration,
        lower_size_bound: u64,
        upper_size_bound: u64,
    ) -> Result<Self, Error> {
        if lower_size_bound > upper_size_bound {
            return Err(Error::InvalidConfig(format!(
                "retention lower size bound ({lower_size_bound}) exceeds upper bound ({upper_size_bound})"
            )));
        }
        Ok(RetentionPolicy {
            max_record_age,
            lower_size_bound,
            upper_size_bound,
        })
    }

    pub fn max_record_age(&self) -> Duration {
        self.max_record_age
    }

    pub fn lower_size_bound(&self) -> u64 {
        self.lower_size_bound
    }

    pub fn upper_size_bound(&self) -> u64 {
        self.upper_size_bound
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy {
            max_record_age: DEFAULT_MAX_RECORD_AGE,
            lower_size_bound: DEFAULT_LOWER_SIZE_BOUND,
            upper_size_bound: DEFAULT_UPPER_SIZE_BOUND,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        let policy = RetentionPolicy::default();
        assert!(policy.lower_size_bound() <= policy.upper_size_bound());
        assert_eq!(policy.max_record_age(), Duration::from_millis(6_300_000));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let result = RetentionPolicy::new(DEFAULT_MAX_RECORD_AGE, 100, 50);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_equal_bounds_accepted() {
        let policy = RetentionPolicy::new(DEFAULT_MAX_RECORD_AGE, 64, 64).unwrap();
        assert_eq!(policy.lower_size_bound(), policy.upper_size_bound());
    }
}
