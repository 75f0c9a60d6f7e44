use crate::error::SyncError;

/// Largest count a semaphore can hold on every backend.
///
/// This is the Win32 `LONG` limit; the POSIX backend enforces the same bound
/// so that overflow behaves identically everywhere.
pub const SEMAPHORE_MAX: u32 = i32::MAX as u32;

/// Counting lock with bounded capacity.
pub trait Semaphore: Send + Sync {
    /// Block while the count is zero, then decrement it.
    fn lock_wait(&self) -> bool;

    /// Decrement only if the count is positive. Never blocks; a zero count
    /// yields `false` with [`SyncError::Busy`].
    fn lock_try(&self) -> bool;

    /// Increment the count by one and unblock at most one waiter.
    ///
    /// Exceeding [`SEMAPHORE_MAX`] fails with [`SyncError::Overflow`] and
    /// leaves the count unchanged.
    fn release(&self) -> bool;

    /// Current count. Advisory only: it may be stale as soon as it is read.
    fn value(&self) -> u32;

    fn last_error(&self) -> Option<SyncError>;
}

/// Rejects initial counts the backends cannot represent.
pub(crate) fn check_initial(initial: u32) -> Result<(), SyncError> {
    if initial > SEMAPHORE_MAX {
        return Err(SyncError::Overflow { max: SEMAPHORE_MAX });
    }
    Ok(())
}
