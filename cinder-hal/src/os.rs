//! Bus locking built on `critical-section`.
//!
//! A non-blocking binary semaphore: acquisition either succeeds
//! immediately or reports [`Error::Busy`] so the caller can retry with
//! its own timeout policy.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::{Error, Result};

/// One-owner lock guarding a shared bus.
#[derive(Debug)]
pub struct BusLock {
    taken: AtomicBool,
}

impl BusLock {
    /// A released lock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            taken: AtomicBool::new(false),
        }
    }

    /// Try to take the lock.
    pub fn acquire(&self) -> Result<()> {
        critical_section::with(|_| {
            if self.taken.load(Ordering::Relaxed) {
                Err(Error::Busy)
            } else {
                self.taken.store(true, Ordering::Relaxed);
                Ok(())
            }
        })
    }

    /// Release the lock. Releasing a free lock is a no-op.
    pub fn release(&self) {
        critical_section::with(|_| self.taken.store(false, Ordering::Relaxed));
    }

    /// Whether the lock is currently held.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.taken.load(Ordering::Relaxed)
    }
}

impl Default for BusLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release_cycle() {
        let lock = BusLock::new();
        assert!(!lock.is_held());
        lock.acquire().unwrap();
        assert!(lock.is_held());
        assert_eq!(lock.acquire(), Err(Error::Busy));
        lock.release();
        assert!(lock.acquire().is_ok());
    }
}
