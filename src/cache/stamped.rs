//! Values stamped with their last write time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached value and the time it was last written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampedValue<T> {
    /// The cached value.
    pub value: T,
    /// Last write time.
    pub stamp: DateTime<Utc>,
}

impl<T> StampedValue<T> {
    /// Stamps a value with the current time.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value,
            stamp: Utc::now(),
        }
    }

    /// Stamps a value with an explicit time.
    #[must_use]
    pub const fn with_stamp(value: T, stamp: DateTime<Utc>) -> Self {
        Self { value, stamp }
    }

    /// Time since the last write. Never negative.
    #[must_use]
    pub fn age(&self) -> Duration {
        (Utc::now() - self.stamp).to_std().unwrap_or(Duration::ZERO)
    }

    /// Returns true once the value is at least `ttl` old.
    #[must_use]
    pub fn update_allowed(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }

    /// Maps the value, keeping the stamp.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StampedValue<U> {
        StampedValue {
            value: f(self.value),
            stamp: self.stamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_value_blocks_update() {
        let value = StampedValue::new(1);
        assert!(!value.update_allowed(Duration::from_secs(15)));
        assert!(value.update_allowed(Duration::ZERO));
    }

    #[test]
    fn test_old_value_allows_update() {
        let stamp = Utc::now() - chrono::Duration::seconds(20);
        let value = StampedValue::with_stamp("stack", stamp);
        assert!(value.update_allowed(Duration::from_secs(15)));
        assert!(!value.update_allowed(Duration::from_secs(3600)));
    }

    #[test]
    fn test_future_stamp_has_zero_age() {
        let stamp = Utc::now() + chrono::Duration::seconds(60);
        let value = StampedValue::with_stamp((), stamp);
        assert_eq!(value.age(), Duration::ZERO);
    }
}
