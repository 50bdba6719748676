use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::watch;

/// Typed shared observable value.
///
/// Replaces ad-hoc shared mutable state: holders call [`set`](Self::set),
/// observers either [`get`](Self::get) the current value or
/// [`subscribe`](Self::subscribe) to changes. New subscribers immediately
/// observe the latest value. After [`finish`](Self::finish), writes are
/// ignored.
#[derive(Clone, Debug)]
pub struct SharedReference<T> {
    tx: watch::Sender<T>,
    finished: Arc<AtomicBool>,
}

impl<T: Clone + Send + Sync + 'static> SharedReference<T> {
    #[must_use]
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            tx,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Publish a new value to all subscribers. Ignored after `finish()`.
    pub fn set(&self, value: T) {
        if self.finished.load(Ordering::Acquire) {
            return;
        }
        let _ = self.tx.send(value);
    }

    /// Subscribe to value changes. The receiver sees the current value as
    /// already-changed, so a first `changed().await` resolves immediately
    /// only after a subsequent `set`.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Freeze the value: subsequent `set` calls are no-ops.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}
