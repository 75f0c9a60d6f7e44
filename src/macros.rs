/// Per-operation lock tracing, compiled in only with the `sync-debug` feature.
macro_rules! sync_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "sync-debug")]
        tracing::trace!($($arg)*);
    };
}
