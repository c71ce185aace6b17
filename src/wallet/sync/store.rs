//! Observable state containers.
//!
//! `Store<T>` holds one value and notifies every subscriber when it is replaced. A
//! `Projection<S, T>` is a read-only view computed from a store's value by a pure function, so
//! it is always consistent with the latest published value and carries no state of its own.
//! Both are thin layers over `tokio::sync::watch`.

use std::fmt;
use tokio::sync::watch;

/// Writable observable value
pub struct Store<T> {
    sender: watch::Sender<T>,
}

impl<T: Clone> Store<T> {
    /// Create a store holding `initial`.
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Replace the value through `update`, notifying subscribers only if it returns `true`.
    ///
    /// `update` runs while the store is locked, so no other writer can interleave with it.
    pub fn set_if(&self, update: impl FnOnce(&mut T) -> bool) -> bool {
        self.sender.send_if_modified(update)
    }

    /// Receiver that observes every subsequent replacement.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// Read-only view of this store computed by `map`.
    pub fn project<U>(&self, map: fn(&T) -> U) -> Projection<T, U> {
        Projection {
            source: self.subscribe(),
            map,
        }
    }
}

impl<T: PartialEq + Clone> Store<T> {
    /// Replace the value, notifying subscribers only if it differs from the current one.
    pub fn set_if_changed(&self, value: T) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}

impl<T: Clone + Default> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Store").field(&*self.sender.borrow()).finish()
    }
}

/// Read-only value derived from a store
#[derive(Clone)]
pub struct Projection<S, T> {
    source: watch::Receiver<S>,
    map: fn(&S) -> T,
}

impl<S, T> Projection<S, T> {
    /// Value derived from the latest published source value.
    pub fn get(&self) -> T {
        (self.map)(&self.source.borrow())
    }

    /// Wait until the source is replaced and return the recomputed value.
    ///
    /// # Returns
    /// `None` once the source store has been dropped.
    pub async fn changed(&mut self) -> Option<T> {
        self.source.changed().await.ok()?;
        Some((self.map)(&self.source.borrow_and_update()))
    }
}

impl<S, T: fmt::Debug> fmt::Debug for Projection<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Projection").field(&self.get()).finish()
    }
}
