use crate::error::SyncError;

/// Exclusive lock, optionally recursive.
///
/// The recursive mode is fixed at construction. A non-recursive mutex locked
/// a second time by its own holder deadlocks; that is the documented
/// behaviour, not an error the implementation detects.
///
/// Failures never panic. They are reported as `false` plus
/// [`last_error`](Mutex::last_error).
pub trait Mutex: Send + Sync {
    /// Block until the lock is acquired.
    ///
    /// Returns `false` on platform failure. On Win32 an abandoned mutex also
    /// returns `false` with [`SyncError::Abandoned`]; the caller owns the lock
    /// in that case and must still release it.
    fn lock_wait(&self) -> bool;

    /// Acquire the lock only if it is immediately available.
    ///
    /// Contention yields `false` with [`SyncError::Busy`].
    fn lock_try(&self) -> bool;

    /// Release one level of ownership.
    ///
    /// Releasing a lock the caller does not hold is a contract violation.
    fn release(&self) -> bool;

    /// Diagnostic for the most recent failed operation on this object.
    fn last_error(&self) -> Option<SyncError>;

    fn is_recursive(&self) -> bool;

    /// [`lock_wait`](Mutex::lock_wait) reporting this call's own outcome.
    ///
    /// `last_error()` is shared by every thread using the object, so it may
    /// already describe another thread's operation by the time it is read.
    /// Backends override this to return their result directly.
    fn lock_wait_result(&self) -> Result<(), SyncError> {
        if self.lock_wait() {
            Ok(())
        } else {
            Err(self.last_error().unwrap_or(SyncError::Uninitialized))
        }
    }

    /// [`release`](Mutex::release) reporting this call's own outcome.
    fn release_result(&self) -> Result<(), SyncError> {
        if self.release() {
            Ok(())
        } else {
            Err(self.last_error().unwrap_or(SyncError::Uninitialized))
        }
    }
}

impl<'m> dyn Mutex + 'm {
    /// Lock for the lifetime of the returned guard.
    pub fn scoped(&self) -> ScopedLock<'_> {
        ScopedLock::new(self)
    }
}

/// RAII guard that holds a [`Mutex`] from construction until drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ScopedLock<'a> {
    mutex: &'a dyn Mutex,
    locked: bool,
}

impl<'a> ScopedLock<'a> {
    pub fn new(mutex: &'a dyn Mutex) -> Self {
        let locked = matches!(mutex.lock_wait_result(), Ok(()) | Err(SyncError::Abandoned));
        Self { mutex, locked }
    }

    /// Whether the guard actually owns the lock.
    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl Drop for ScopedLock<'_> {
    fn drop(&mut self) {
        if self.locked {
            self.mutex.release();
        }
    }
}
