use core::ptr;

use crate::error::{LastError, SyncError, SyncResult};
use crate::mutex::Mutex;

use super::{ffi, last_os_error, OwnedHandle};

/// Recursive mode uses a kernel mutex, which Win32 makes re-entrant and
/// which reports abandonment. Non-recursive mode uses a binary semaphore so
/// that re-entry by the holder blocks like it does on POSIX.
pub struct Win32Mutex {
    handle: Option<OwnedHandle>,
    recursive: bool,
    error: LastError,
}

impl Win32Mutex {
    pub fn new(recursive: bool) -> Self {
        let error = LastError::new();
        // SAFETY: anonymous objects with default security; null names and
        // attributes are documented as valid.
        let created = unsafe {
            if recursive {
                OwnedHandle::from_raw(ffi::CreateMutexW(ptr::null_mut(), 0, ptr::null()), "CreateMutexW")
            } else {
                OwnedHandle::from_raw(
                    ffi::CreateSemaphoreW(ptr::null_mut(), 1, 1, ptr::null()),
                    "CreateSemaphoreW",
                )
            }
        };
        let handle = match created {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(recursive, error = %err, "mutex creation failed");
                error.set(err);
                None
            }
        };
        tracing::debug!(recursive, "win32 mutex created");
        Self {
            handle,
            recursive,
            error,
        }
    }

    fn acquire(&self, millis: ffi::DWORD) -> SyncResult<()> {
        let handle = self.handle.as_ref().ok_or(SyncError::Uninitialized)?;
        // SAFETY: `handle` is a live mutex or semaphore handle.
        match unsafe { ffi::WaitForSingleObject(handle.raw(), millis) } {
            ffi::WAIT_OBJECT_0 => Ok(()),
            ffi::WAIT_ABANDONED => Err(SyncError::Abandoned),
            ffi::WAIT_TIMEOUT => Err(SyncError::Busy),
            _ => Err(last_os_error("WaitForSingleObject")),
        }
    }

    fn try_release(&self) -> SyncResult<()> {
        let handle = self.handle.as_ref().ok_or(SyncError::Uninitialized)?;
        // SAFETY: `handle` is live; a failed release only sets an error code.
        let released = unsafe {
            if self.recursive {
                ffi::ReleaseMutex(handle.raw())
            } else {
                ffi::ReleaseSemaphore(handle.raw(), 1, ptr::null_mut())
            }
        };
        if released == 0 {
            let op = if self.recursive { "ReleaseMutex" } else { "ReleaseSemaphore" };
            return Err(last_os_error(op));
        }
        Ok(())
    }
}

impl Mutex for Win32Mutex {
    fn lock_wait(&self) -> bool {
        self.lock_wait_result().is_ok()
    }

    fn lock_try(&self) -> bool {
        self.error.record("mutex_lock_try", self.acquire(0))
    }

    fn release(&self) -> bool {
        self.release_result().is_ok()
    }

    fn last_error(&self) -> Option<SyncError> {
        self.error.get()
    }

    fn is_recursive(&self) -> bool {
        self.recursive
    }

    fn lock_wait_result(&self) -> SyncResult<()> {
        let result = self.acquire(ffi::INFINITE);
        sync_trace!(ok = result.is_ok(), "mutex lock_wait");
        self.error.track("mutex_lock_wait", result)
    }

    fn release_result(&self) -> SyncResult<()> {
        self.error.track("mutex_release", self.try_release())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_recursive_try_lock_reports_busy() {
        let mutex = Win32Mutex::new(false);
        assert!(mutex.lock_wait());
        assert!(!mutex.lock_try());
        assert_eq!(mutex.last_error(), Some(SyncError::Busy));
        assert!(mutex.release());
    }

    #[test]
    fn test_recursive_mutex_reenters() {
        let mutex = Win32Mutex::new(true);
        assert!(mutex.lock_wait());
        assert!(mutex.lock_try());
        assert!(mutex.release());
        assert!(mutex.release());
        // Releasing an unowned kernel mutex is refused by the OS.
        assert!(!mutex.release());
        assert!(matches!(mutex.last_error(), Some(SyncError::Os { op: "ReleaseMutex", .. })));
    }
}
