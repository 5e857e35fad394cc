//! Millisecond tick source for blocking timeouts.
//!
//! The application advances the counter from its SysTick interrupt
//! (usually [`increment`] at 1 kHz). Drivers only ever read it, so a
//! relaxed atomic is enough. Tests drive it directly with [`advance`].

use core::sync::atomic::{AtomicU32, Ordering};

static TICK: AtomicU32 = AtomicU32::new(0);

/// Current tick count in milliseconds. Wraps after ~49.7 days; elapsed
/// times are computed with wrapping subtraction so the wrap is
/// harmless.
#[inline]
#[must_use]
pub fn now() -> u32 {
    TICK.load(Ordering::Relaxed)
}

/// Advance the counter by one millisecond. Call from the SysTick
/// interrupt.
#[inline]
pub fn increment() {
    TICK.fetch_add(1, Ordering::Relaxed);
}

/// Advance the counter by `ms` milliseconds.
#[inline]
pub fn advance(ms: u32) {
    TICK.fetch_add(ms, Ordering::Relaxed);
}

/// Milliseconds elapsed since `start`, wrap-safe.
#[inline]
#[must_use]
pub fn elapsed_since(start: u32) -> u32 {
    now().wrapping_sub(start)
}

/// Deadline tracker for blocking operations.
///
/// A timeout of zero expires on the first poll after one failed check,
/// matching the convention that zero means "check once and give up".
/// [`crate::TIMEOUT_FOREVER`] never expires.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: u32,
    timeout_ms: u32,
}

impl Deadline {
    /// Start a deadline of `timeout_ms` milliseconds from now.
    #[must_use]
    pub fn new(timeout_ms: u32) -> Self {
        Self {
            start: now(),
            timeout_ms,
        }
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn expired(&self) -> bool {
        if self.timeout_ms == crate::TIMEOUT_FOREVER {
            return false;
        }
        self.timeout_ms == 0 || elapsed_since(self.start) >= self.timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests in this module share the process-wide counter, so each one
    // works in relative terms only.

    #[test]
    fn test_elapsed_tracks_advance() {
        let start = now();
        advance(25);
        assert!(elapsed_since(start) >= 25);
    }

    #[test]
    fn test_deadline_zero_expires_immediately() {
        let d = Deadline::new(0);
        assert!(d.expired());
    }

    #[test]
    fn test_deadline_forever_never_expires() {
        let d = Deadline::new(crate::TIMEOUT_FOREVER);
        advance(1_000_000);
        assert!(!d.expired());
    }

    #[test]
    fn test_deadline_expires_after_timeout() {
        let d = Deadline::new(10);
        assert!(!d.expired());
        advance(10);
        assert!(d.expired());
    }
}
