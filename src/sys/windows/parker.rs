use core::cell::UnsafeCell;
use std::time::Duration;

use crate::condition::WaitClock;
use crate::error::{SyncError, SyncResult};
use crate::sys::Parker;

use super::{ffi, last_os_error, millis};

/// `SRWLOCK` + `CONDITION_VARIABLE` pair. Neither needs initialization
/// beyond zeroing nor destruction.
pub struct Win32Parker {
    lock: Box<UnsafeCell<ffi::SRWLOCK>>,
    cond: Box<UnsafeCell<ffi::CONDITION_VARIABLE>>,
}

// SAFETY: SRW locks and condition variables are built for cross-thread use
// and are boxed so their addresses never change.
unsafe impl Send for Win32Parker {}
unsafe impl Sync for Win32Parker {}

impl Parker for Win32Parker {
    fn new(_clock: WaitClock) -> SyncResult<Self> {
        Ok(Self {
            lock: Box::new(UnsafeCell::new(ffi::SRWLOCK_INIT)),
            cond: Box::new(UnsafeCell::new(ffi::CONDITION_VARIABLE_INIT)),
        })
    }

    fn lock(&self) -> SyncResult<()> {
        // SAFETY: the lock lives as long as `self`.
        unsafe { ffi::AcquireSRWLockExclusive(self.lock.get()) };
        Ok(())
    }

    fn unlock(&self) -> SyncResult<()> {
        // SAFETY: the caller holds the lock.
        unsafe { ffi::ReleaseSRWLockExclusive(self.lock.get()) };
        Ok(())
    }

    fn wait(&self, timeout: Option<Duration>) -> SyncResult<()> {
        // SAFETY: the caller holds the lock, as the trait requires.
        let woke = unsafe {
            ffi::SleepConditionVariableSRW(self.cond.get(), self.lock.get(), millis(timeout), 0)
        };
        if woke == 0 {
            let err = last_os_error("SleepConditionVariableSRW");
            if err != SyncError::os("SleepConditionVariableSRW", ffi::ERROR_TIMEOUT as i32) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn notify_one(&self) -> SyncResult<()> {
        // SAFETY: the condition variable lives as long as `self`.
        unsafe { ffi::WakeConditionVariable(self.cond.get()) };
        Ok(())
    }

    fn notify_all(&self) -> SyncResult<()> {
        // SAFETY: as above.
        unsafe { ffi::WakeAllConditionVariable(self.cond.get()) };
        Ok(())
    }
}
