use core::ffi::c_void;
use core::mem::MaybeUninit;
use std::sync::Arc;

use crate::error::{SyncError, SyncResult};
use crate::runnable::Runnable;
use crate::thread::{Thread, ThreadCore, ThreadLaunch, ThreadOptions, ThreadState};

use super::check;

type StartRoutine = extern "C-unwind" fn(*mut c_void) -> *mut c_void;

// Declared here rather than taken from libc: the start routine must use the
// "C-unwind" ABI so a cancellation's forced unwind may cross it.
extern "C" {
    #[link_name = "pthread_create"]
    fn pthread_create_unwind(
        native: *mut libc::pthread_t,
        attr: *const libc::pthread_attr_t,
        start: StartRoutine,
        arg: *mut c_void,
    ) -> libc::c_int;

    fn pthread_cancel(native: libc::pthread_t) -> libc::c_int;
}

/// A pthread running a shared [`Runnable`].
pub struct PosixThread {
    core: ThreadCore,
    /// Set from a successful `pthread_create` until joined or detached.
    native: Option<libc::pthread_t>,
}

// SAFETY: a pthread_t is an opaque identifier usable from any thread; on
// some targets it is a raw pointer, which is what blocks the auto impl.
unsafe impl Send for PosixThread {}

impl PosixThread {
    pub fn new(runnable: Arc<dyn Runnable>, options: ThreadOptions) -> Self {
        Self {
            core: ThreadCore::new(runnable, options),
            native: None,
        }
    }

    fn try_start(&mut self) -> SyncResult<()> {
        if self.native.is_some() {
            if self.core.state() == ThreadState::Running {
                return Ok(());
            }
            // The previous run finished or was stopped but never reaped; a
            // pending cancellation is waited out here.
            self.join()?;
        }

        let mut attr = MaybeUninit::<libc::pthread_attr_t>::uninit();
        // SAFETY: `attr` is initialized here and destroyed once below.
        check("pthread_attr_init", unsafe {
            libc::pthread_attr_init(attr.as_mut_ptr())
        })?;

        let spawned = self.spawn_with(attr.as_mut_ptr());
        // SAFETY: initialized above; no longer needed once the thread exists.
        unsafe { libc::pthread_attr_destroy(attr.as_mut_ptr()) };

        match spawned {
            Ok(native) => {
                self.native = Some(native);
                tracing::debug!(thread = self.core.label(), "posix thread started");
                Ok(())
            }
            Err(err) => {
                self.core.set_state(ThreadState::Created);
                Err(err)
            }
        }
    }

    fn spawn_with(&self, attr: *mut libc::pthread_attr_t) -> SyncResult<libc::pthread_t> {
        if let Some(size) = self.core.options.requested_stack_size() {
            // SAFETY: `attr` is an initialized attribute object.
            check("pthread_attr_setstacksize", unsafe {
                libc::pthread_attr_setstacksize(attr, size)
            })?;
        }

        let launch = Box::into_raw(Box::new(self.core.launch()));
        // SAFETY: an all-zero pthread_t is a valid placeholder.
        let mut native: libc::pthread_t = unsafe { core::mem::zeroed() };
        // SAFETY: `launch` stays valid until the new thread takes ownership
        // of it in `thread_start`, or until we reclaim it on failure below.
        let rc = unsafe { pthread_create_unwind(&mut native, attr, thread_start, launch.cast()) };
        if rc != 0 {
            // SAFETY: the thread was not created, so `launch` is still ours.
            drop(unsafe { Box::from_raw(launch) });
            return Err(SyncError::os("pthread_create", rc));
        }
        Ok(native)
    }

    fn join(&mut self) -> SyncResult<()> {
        let Some(native) = self.native else {
            return Ok(());
        };
        // SAFETY: `native` came from pthread_create and has not been joined
        // or detached; `&mut self` rules out a concurrent join.
        check("pthread_join", unsafe {
            libc::pthread_join(native, core::ptr::null_mut())
        })?;
        self.native = None;
        self.core.set_state(ThreadState::Stopped);
        tracing::debug!(thread = self.core.label(), "posix thread joined");
        Ok(())
    }

    fn try_stop(&mut self) -> SyncResult<()> {
        let Some(native) = self.native else {
            return Ok(());
        };
        if self.core.state() != ThreadState::Running {
            return Ok(());
        }
        tracing::warn!(thread = self.core.label(), "cancelling posix thread");
        // SAFETY: `native` refers to a thread that has not been joined.
        check("pthread_cancel", unsafe { pthread_cancel(native) })?;
        // Deferred: the thread runs on until its next cancellation point.
        // `join` publishes `Stopped` once it has actually exited.
        self.core.set_state(ThreadState::Stopping);
        Ok(())
    }
}

extern "C-unwind" fn thread_start(arg: *mut c_void) -> *mut c_void {
    // SAFETY: `arg` is the box leaked by `spawn_with`, handed over once.
    let launch = *unsafe { Box::from_raw(arg.cast::<ThreadLaunch>()) };

    #[cfg(target_os = "linux")]
    if let Some(name) = &launch.name {
        set_os_thread_name(name);
    }

    // Cancellation unwinds through this frame, so nothing here may catch.
    launch.execute();
    core::ptr::null_mut()
}

/// Linux limits thread names to 15 bytes plus the terminator.
#[cfg(target_os = "linux")]
fn set_os_thread_name(name: &str) {
    let bytes = &name.as_bytes()[..name.len().min(15)];
    if let Ok(name) = std::ffi::CString::new(bytes) {
        // SAFETY: `name` is a valid C string for the duration of the call.
        unsafe {
            libc::pthread_setname_np(libc::pthread_self(), name.as_ptr());
        }
    }
}

impl Thread for PosixThread {
    fn start(&mut self) -> bool {
        let result = self.try_start();
        self.core.error.record("thread_start", result)
    }

    unsafe fn stop(&mut self) -> bool {
        let result = self.try_stop();
        self.core.error.record("thread_stop", result)
    }

    fn wait(&mut self) -> bool {
        let result = self.join();
        self.core.error.record("thread_wait", result)
    }

    fn state(&self) -> ThreadState {
        self.core.state()
    }

    fn last_error(&self) -> Option<SyncError> {
        self.core.error.get()
    }

    fn name(&self) -> Option<&str> {
        self.core.options.thread_name()
    }
}

impl Drop for PosixThread {
    fn drop(&mut self) {
        let Some(native) = self.native.take() else {
            return;
        };
        // SAFETY: `native` has been neither joined nor detached.
        unsafe {
            match self.core.state() {
                ThreadState::Finished => {
                    libc::pthread_join(native, core::ptr::null_mut());
                }
                ThreadState::Running => {
                    tracing::warn!(
                        thread = self.core.label(),
                        "thread handle dropped while running, forcing stop"
                    );
                    pthread_cancel(native);
                    libc::pthread_detach(native);
                }
                ThreadState::Stopping => {
                    tracing::warn!(
                        thread = self.core.label(),
                        "thread handle dropped before cancellation completed, detaching"
                    );
                    libc::pthread_detach(native);
                }
                _ => {
                    libc::pthread_detach(native);
                }
            }
        }
    }
}
