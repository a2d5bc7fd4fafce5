//! Exclusive in-operation guard.
//!
//! Every public state-mutating entry point holds the lock for its whole
//! body. A second acquisition while held fails with
//! [`PremarketError::OperationInProgress`] instead of waiting or nesting:
//! a custodian that calls back into the exchange mid-movement is refused.
//!
//! Batch entry points take the lock once and run the unguarded single-item
//! bodies. They must never call the guarded single-item entry points, or
//! the nested acquisition fails.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use premarket_types::{PremarketError, Result};

/// Shared flag. Clones observe the same lock.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLock {
    held: Arc<AtomicBool>,
}

impl ExecutionLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire, or fail immediately if already held.
    pub fn try_enter(&self) -> Result<LockHandle> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PremarketError::OperationInProgress)?;
        Ok(LockHandle {
            held: Arc::clone(&self.held),
        })
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the lock when dropped, on success and error paths alike.
#[derive(Debug)]
pub struct LockHandle {
    held: Arc<AtomicBool>,
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_acquire_fails() {
        let lock = ExecutionLock::new();
        let _outer = lock.try_enter().unwrap();
        assert!(lock.is_held());
        assert!(matches!(
            lock.try_enter(),
            Err(PremarketError::OperationInProgress)
        ));
    }

    #[test]
    fn released_on_drop() {
        let lock = ExecutionLock::new();
        {
            let _h = lock.try_enter().unwrap();
        }
        assert!(!lock.is_held());
        assert!(lock.try_enter().is_ok());
    }

    #[test]
    fn released_on_error_path() {
        fn failing(lock: &ExecutionLock) -> Result<()> {
            let _h = lock.try_enter()?;
            Err(PremarketError::EmptyBatch)
        }
        let lock = ExecutionLock::new();
        assert!(failing(&lock).is_err());
        assert!(!lock.is_held());
    }

    #[test]
    fn clones_share_state() {
        let lock = ExecutionLock::new();
        let other = lock.clone();
        let _h = lock.try_enter().unwrap();
        assert!(other.try_enter().is_err());
    }
}
