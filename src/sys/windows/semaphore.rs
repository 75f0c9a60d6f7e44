use core::ptr;

use portable_atomic::{AtomicU32, Ordering};

use crate::error::{LastError, SyncError, SyncResult};
use crate::semaphore::{check_initial, Semaphore, SEMAPHORE_MAX};

use super::{ffi, last_os_error, OwnedHandle};

/// Kernel semaphore with maximum count [`SEMAPHORE_MAX`].
pub struct Win32Semaphore {
    handle: Option<OwnedHandle>,
    /// Mirror of the kernel count for `value()`; refreshed by every
    /// successful operation and never used for decisions.
    value: AtomicU32,
    error: LastError,
}

impl Win32Semaphore {
    pub fn new(initial: u32) -> Self {
        let error = LastError::new();
        let created = check_initial(initial).and_then(|()| {
            // SAFETY: anonymous semaphore with default security.
            OwnedHandle::from_raw(
                unsafe {
                    ffi::CreateSemaphoreW(
                        ptr::null_mut(),
                        initial as i32,
                        SEMAPHORE_MAX as i32,
                        ptr::null(),
                    )
                },
                "CreateSemaphoreW",
            )
        });
        let handle = match created {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(initial, error = %err, "semaphore creation failed");
                error.set(err);
                None
            }
        };
        tracing::debug!(initial, "win32 semaphore created");
        let value = if handle.is_some() { initial } else { 0 };
        Self {
            handle,
            value: AtomicU32::new(value),
            error,
        }
    }

    fn acquire(&self, millis: ffi::DWORD) -> SyncResult<()> {
        let handle = self.handle.as_ref().ok_or(SyncError::Uninitialized)?;
        // SAFETY: `handle` is a live semaphore handle.
        match unsafe { ffi::WaitForSingleObject(handle.raw(), millis) } {
            ffi::WAIT_OBJECT_0 => {
                let _ = self
                    .value
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
                Ok(())
            }
            ffi::WAIT_TIMEOUT => Err(SyncError::Busy),
            _ => Err(last_os_error("WaitForSingleObject")),
        }
    }

    fn try_release(&self) -> SyncResult<()> {
        let handle = self.handle.as_ref().ok_or(SyncError::Uninitialized)?;
        let mut previous = 0i32;
        // SAFETY: `handle` is live and `previous` outlives the call.
        if unsafe { ffi::ReleaseSemaphore(handle.raw(), 1, &mut previous) } == 0 {
            let err = last_os_error("ReleaseSemaphore");
            if err == SyncError::os("ReleaseSemaphore", ffi::ERROR_TOO_MANY_POSTS as i32) {
                return Err(SyncError::Overflow { max: SEMAPHORE_MAX });
            }
            return Err(err);
        }
        self.value.store(previous as u32 + 1, Ordering::Relaxed);
        Ok(())
    }
}

impl Semaphore for Win32Semaphore {
    fn lock_wait(&self) -> bool {
        let result = self.acquire(ffi::INFINITE);
        sync_trace!(ok = result.is_ok(), "semaphore lock_wait");
        self.error.record("semaphore_lock_wait", result)
    }

    fn lock_try(&self) -> bool {
        self.error.record("semaphore_lock_try", self.acquire(0))
    }

    fn release(&self) -> bool {
        self.error.record("semaphore_release", self.try_release())
    }

    fn value(&self) -> u32 {
        self.value.load(Ordering::Relaxed)
    }

    fn last_error(&self) -> Option<SyncError> {
        self.error.get()
    }
}
