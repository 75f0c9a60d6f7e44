/// Code that a [`Thread`](crate::Thread) executes on its native thread.
///
/// A Runnable is shared between the spawning code and the thread handle for
/// the lifetime of the thread, hence `&self`: any state it mutates must be
/// protected by its own synchronization.
pub trait Runnable: Send + Sync {
    fn run(&self);
}

impl<F> Runnable for F
where
    F: Fn() + Send + Sync,
{
    fn run(&self) {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter(AtomicUsize);

    impl Runnable for Counter {
        fn run(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_closure_is_runnable() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let runnable: Arc<dyn Runnable> = Arc::new(move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        runnable.run();
        runnable.run();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_struct_runnable() {
        let counter = Counter(AtomicUsize::new(0));
        counter.run();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
