//! Portable OS threads and blocking synchronization primitives.
//!
//! One contract for [`Mutex`], [`Semaphore`], [`Condition`] and [`Thread`],
//! implemented once per target on top of pthreads (unix) or Win32
//! (windows). Callers construct primitives through the factory functions and
//! never see which backend is active.

#[macro_use]
mod macros;

pub mod condition;
pub mod error;
pub mod mutex;
pub mod runnable;
pub mod semaphore;
pub mod sync;
pub mod sys;
pub mod thread;

pub use condition::{Condition, ConditionAttributes, WaitClock};
pub use error::{LastError, SyncError, SyncResult};
pub use mutex::{Mutex, ScopedLock};
pub use runnable::Runnable;
pub use semaphore::{Semaphore, SEMAPHORE_MAX};
pub use sync::{current_thread_id, sleep_ms, yield_thread};
pub use sys::{
    backend_name, create_condition, create_mutex, create_semaphore, create_thread,
    DefaultPlatform, Platform,
};
pub use thread::{Thread, ThreadOptions, ThreadState};
