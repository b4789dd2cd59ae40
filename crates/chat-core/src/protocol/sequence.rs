//! Per-client identifier sequence for subscription and receipt ids.
//!
//! STOMP leaves the format of `id` and `receipt` header values to the client;
//! they only need to be unique within one broker session.  Each broker client
//! owns its own counter, so ids restart at `0` for every new connection.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter that formats prefixed identifiers.
///
/// # Examples
///
/// ```rust
/// use chat_core::protocol::SequenceCounter;
///
/// let ids = SequenceCounter::new();
/// assert_eq!(ids.next_id("sub"), "sub-0");
/// assert_eq!(ids.next_id("rcpt"), "rcpt-1");
/// ```
#[derive(Debug, Default)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    /// Creates a new counter starting at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next raw value.  Wraps from `u64::MAX` to 0.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns `"{prefix}-{n}"` using the next value.
    pub fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next())
    }

    /// Returns the current value without incrementing.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_counter_starts_at_zero() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 0);
    }

    #[test]
    fn test_next_id_shares_one_sequence_across_prefixes() {
        // Arrange
        let counter = SequenceCounter::new();

        // Act
        let a = counter.next_id("sub");
        let b = counter.next_id("rcpt");
        let c = counter.next_id("sub");

        // Assert – ids never collide even when prefixes differ
        assert_eq!(a, "sub-0");
        assert_eq!(b, "rcpt-1");
        assert_eq!(c, "sub-2");
    }

    #[test]
    fn test_sequence_counter_wraps_at_u64_max() {
        let counter = SequenceCounter {
            inner: AtomicU64::new(u64::MAX),
        };
        assert_eq!(counter.next(), u64::MAX);
        assert_eq!(counter.next(), 0);
    }

    #[test]
    fn test_current_does_not_increment() {
        let counter = SequenceCounter::new();
        counter.next();
        assert_eq!(counter.current(), 1);
        assert_eq!(counter.next(), 1);
    }
}
