use spin::Mutex as SpinMutex;

/// Failure reported by a primitive through its `last_error()` slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// A native call returned an error code.
    #[error("{op} failed: {}", os_message(.code))]
    Os { op: &'static str, code: i32 },
    /// The previous owner exited while holding the lock. Ownership has been
    /// granted to the caller anyway.
    #[error("lock object was abandoned by its previous owner")]
    Abandoned,
    /// Non-blocking acquisition found the object held.
    #[error("object is held by another owner")]
    Busy,
    #[error("wait timed out after {millis} ms")]
    TimedOut { millis: u32 },
    #[error("semaphore count would exceed {max}")]
    Overflow { max: u32 },
    /// Creation of the native object failed; the object is unusable.
    #[error("native object was never initialized")]
    Uninitialized,
}

impl SyncError {
    pub(crate) fn os(op: &'static str, code: i32) -> Self {
        SyncError::Os { op, code }
    }

    /// Whether this is a normal contention or timeout outcome rather than a
    /// platform failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Busy | SyncError::TimedOut { .. })
    }
}

fn os_message(code: &i32) -> std::io::Error {
    std::io::Error::from_raw_os_error(*code)
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Per-object diagnostic slot.
///
/// Every operation on a primitive either clears the slot (success) or
/// replaces its content (failure), so `get()` always describes the most
/// recent operation on that object only.
#[derive(Debug, Default)]
pub struct LastError {
    slot: SpinMutex<Option<SyncError>>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            slot: SpinMutex::new(None),
        }
    }

    pub fn get(&self) -> Option<SyncError> {
        self.slot.lock().clone()
    }

    pub fn set(&self, error: SyncError) {
        *self.slot.lock() = Some(error);
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }

    /// Folds an operation result into the boolean contract, updating the
    /// slot and logging platform failures.
    pub fn record(&self, op: &'static str, result: SyncResult<()>) -> bool {
        self.track(op, result).is_ok()
    }

    /// Like [`record`](LastError::record) but hands the result back, so the
    /// caller does not have to read the shared slot to learn its outcome.
    pub fn track(&self, op: &'static str, result: SyncResult<()>) -> SyncResult<()> {
        match &result {
            Ok(()) => self.clear(),
            Err(error) => {
                if error.is_transient() {
                    sync_trace!(op, %error, "operation did not complete");
                } else {
                    tracing::warn!(op, %error, "synchronization primitive failure");
                }
                self.set(error.clone());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sets_and_clears() {
        let slot = LastError::new();
        assert_eq!(slot.get(), None);

        assert!(!slot.record("lock", Err(SyncError::Busy)));
        assert_eq!(slot.get(), Some(SyncError::Busy));

        assert!(slot.record("lock", Ok(())));
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn test_track_returns_own_result() {
        let slot = LastError::new();
        assert_eq!(slot.track("lock", Err(SyncError::Abandoned)), Err(SyncError::Abandoned));
        assert_eq!(slot.get(), Some(SyncError::Abandoned));
        assert_eq!(slot.track("lock", Ok(())), Ok(()));
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn test_os_error_message_names_operation() {
        let err = SyncError::os("pthread_mutex_lock", 22);
        let text = err.to_string();
        assert!(text.starts_with("pthread_mutex_lock failed: "), "{text}");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_errors() {
        assert!(SyncError::Busy.is_transient());
        assert!(SyncError::TimedOut { millis: 5 }.is_transient());
        assert!(!SyncError::Abandoned.is_transient());
        assert!(!SyncError::Overflow { max: 1 }.is_transient());
        assert!(!SyncError::Uninitialized.is_transient());
    }
}
