//! Per-entry expiration for moka caches.

use std::time::{Duration, Instant};

/// A cached value that knows when it stops being valid.
pub(crate) trait Deadline {
    fn deadline(&self) -> Instant;
}

/// [`moka::Expiry`] that expires every entry at its own [`Deadline`].
pub(crate) struct DeadlineExpiry;

/// Time left until `target`, or zero once it has passed.
fn saturating_duration_since(current_time: Instant, target: Instant) -> Option<Duration> {
    Some(target.checked_duration_since(current_time).unwrap_or_default())
}

impl<K, V: Deadline> moka::Expiry<K, V> for DeadlineExpiry {
    fn expire_after_create(&self, _key: &K, value: &V, current_time: Instant) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline())
    }

    fn expire_after_update(
        &self,
        _key: &K,
        value: &V,
        current_time: Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline())
    }
}
