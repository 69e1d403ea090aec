//! Observable values for reactive consumers.
//!
//! An [`Observable`] holds the latest value and lets any number of
//! subscribers await changes. It is a thin wrapper over a tokio `watch`
//! channel so UI bindings need nothing beyond `tokio::sync`.

use std::sync::Arc;
use tokio::sync::watch;

/// Latest-value cell with change subscription.
///
/// Clones share the same underlying value.
#[derive(Debug)]
pub struct Observable<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Observable<T> {
    /// Create an observable holding `initial`.
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Modify the value in place and notify subscribers.
    pub fn update(&self, modify: impl FnOnce(&mut T)) {
        self.tx.send_modify(modify);
    }

    /// Subscribe to changes. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Run `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }
}

impl<T: Clone> Observable<T> {
    /// Clone out the current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }
}
