use portable_atomic::{AtomicU32, Ordering};

use crate::condition::WaitClock;
use crate::error::{LastError, SyncError, SyncResult};
use crate::semaphore::{check_initial, Semaphore, SEMAPHORE_MAX};
use crate::sys::{Parker, ParkerGuard};

use super::PosixParker;

/// Counting semaphore built on a [`PosixParker`].
///
/// Unnamed `sem_t` is unavailable on some unix targets, so the count lives
/// in userspace and is only modified with the parker locked. `count` is
/// atomic solely so `value()` can read it without locking.
pub struct PosixSemaphore {
    parker: Option<PosixParker>,
    count: AtomicU32,
    error: LastError,
}

impl PosixSemaphore {
    pub fn new(initial: u32) -> Self {
        let error = LastError::new();
        let parker = check_initial(initial).and_then(|()| PosixParker::new(WaitClock::Monotonic));
        let parker = match parker {
            Ok(parker) => Some(parker),
            Err(err) => {
                tracing::warn!(initial, error = %err, "semaphore creation failed");
                error.set(err);
                None
            }
        };
        tracing::debug!(initial, "posix semaphore created");
        let count = if parker.is_some() { initial } else { 0 };
        Self {
            parker,
            count: AtomicU32::new(count),
            error,
        }
    }

    /// Runs `f` with the parker locked, unlocking on every path including
    /// a cancellation unwinding out of `f`.
    fn locked<T>(&self, f: impl FnOnce(&PosixParker) -> SyncResult<T>) -> SyncResult<T> {
        let parker = self.parker.as_ref().ok_or(SyncError::Uninitialized)?;
        let guard = ParkerGuard::lock(parker)?;
        let result = f(parker);
        let unlocked = guard.unlock();
        let value = result?;
        unlocked?;
        Ok(value)
    }

    fn try_lock_wait(&self) -> SyncResult<()> {
        self.locked(|parker| {
            while self.count.load(Ordering::Relaxed) == 0 {
                parker.wait(None)?;
            }
            self.count.fetch_sub(1, Ordering::Relaxed);
            Ok(())
        })
    }

    fn try_lock_try(&self) -> SyncResult<()> {
        self.locked(|_| {
            if self.count.load(Ordering::Relaxed) == 0 {
                return Err(SyncError::Busy);
            }
            self.count.fetch_sub(1, Ordering::Relaxed);
            Ok(())
        })
    }

    fn try_release(&self) -> SyncResult<()> {
        self.locked(|parker| {
            if self.count.load(Ordering::Relaxed) >= SEMAPHORE_MAX {
                return Err(SyncError::Overflow { max: SEMAPHORE_MAX });
            }
            self.count.fetch_add(1, Ordering::Relaxed);
            parker.notify_one()
        })
    }
}

impl Semaphore for PosixSemaphore {
    fn lock_wait(&self) -> bool {
        let result = self.try_lock_wait();
        sync_trace!(ok = result.is_ok(), "semaphore lock_wait");
        self.error.record("semaphore_lock_wait", result)
    }

    fn lock_try(&self) -> bool {
        self.error.record("semaphore_lock_try", self.try_lock_try())
    }

    fn release(&self) -> bool {
        self.error.record("semaphore_release", self.try_release())
    }

    fn value(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    fn last_error(&self) -> Option<SyncError> {
        self.error.get()
    }
}
