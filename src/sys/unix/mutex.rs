use core::cell::UnsafeCell;
use core::mem::MaybeUninit;

use crate::error::{LastError, SyncError, SyncResult};
use crate::mutex::Mutex;

use super::check;

/// `pthread_mutex_t` of type `PTHREAD_MUTEX_RECURSIVE` or
/// `PTHREAD_MUTEX_NORMAL`. The normal type deadlocks on self re-entry.
pub struct PosixMutex {
    /// Boxed so the native object never moves. `None` if creation failed.
    raw: Option<Box<UnsafeCell<libc::pthread_mutex_t>>>,
    recursive: bool,
    error: LastError,
}

// SAFETY: pthread mutexes are designed to be shared between threads; the
// box keeps the address stable.
unsafe impl Send for PosixMutex {}
unsafe impl Sync for PosixMutex {}

impl PosixMutex {
    pub fn new(recursive: bool) -> Self {
        let error = LastError::new();
        let raw = match init(recursive) {
            Ok(raw) => Some(raw),
            Err(err) => {
                tracing::warn!(recursive, error = %err, "mutex creation failed");
                error.set(err);
                None
            }
        };
        tracing::debug!(recursive, "posix mutex created");
        Self {
            raw,
            recursive,
            error,
        }
    }

    fn raw(&self) -> SyncResult<*mut libc::pthread_mutex_t> {
        self.raw
            .as_ref()
            .map(|raw| raw.get())
            .ok_or(SyncError::Uninitialized)
    }
}

fn init(recursive: bool) -> SyncResult<Box<UnsafeCell<libc::pthread_mutex_t>>> {
    let kind = if recursive {
        libc::PTHREAD_MUTEX_RECURSIVE
    } else {
        libc::PTHREAD_MUTEX_NORMAL
    };

    let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
    // SAFETY: `attr` is initialized by pthread_mutexattr_init before any
    // other use and destroyed exactly once on every path after that.
    unsafe {
        check(
            "pthread_mutexattr_init",
            libc::pthread_mutexattr_init(attr.as_mut_ptr()),
        )?;

        let rc = libc::pthread_mutexattr_settype(attr.as_mut_ptr(), kind);
        if rc != 0 {
            libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
            return Err(SyncError::os("pthread_mutexattr_settype", rc));
        }

        let raw = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
        let rc = libc::pthread_mutex_init(raw.get(), attr.as_ptr());
        libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
        check("pthread_mutex_init", rc)?;
        Ok(raw)
    }
}

impl Mutex for PosixMutex {
    fn lock_wait(&self) -> bool {
        self.lock_wait_result().is_ok()
    }

    fn lock_try(&self) -> bool {
        let result = self.raw().and_then(|raw| {
            // SAFETY: as in `lock_wait_result`.
            match unsafe { libc::pthread_mutex_trylock(raw) } {
                0 => Ok(()),
                libc::EBUSY => Err(SyncError::Busy),
                rc => Err(SyncError::os("pthread_mutex_trylock", rc)),
            }
        });
        self.error.record("mutex_lock_try", result)
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
        let result = self.raw().and_then(|raw| {
            // SAFETY: `raw` points to an initialized mutex owned by `self`.
            check("pthread_mutex_lock", unsafe { libc::pthread_mutex_lock(raw) })
        });
        sync_trace!(ok = result.is_ok(), "mutex lock_wait");
        self.error.track("mutex_lock_wait", result)
    }

    fn release_result(&self) -> SyncResult<()> {
        let result = self.raw().and_then(|raw| {
            // SAFETY: as in `lock_wait_result`.
            check("pthread_mutex_unlock", unsafe { libc::pthread_mutex_unlock(raw) })
        });
        self.error.track("mutex_release", result)
    }
}

impl Drop for PosixMutex {
    fn drop(&mut self) {
        if let Some(raw) = &self.raw {
            // SAFETY: nobody can hold a reference to `self` any more, so the
            // mutex is not in use by another thread.
            let rc = unsafe { libc::pthread_mutex_destroy(raw.get()) };
            if rc != 0 {
                tracing::warn!(error = %SyncError::os("pthread_mutex_destroy", rc), "mutex destroyed while locked");
            }
        }
    }
}
