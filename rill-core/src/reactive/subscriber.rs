//! Subscriber types for the reactive system.
//!
//! A subscriber is anything registered in a listener registry: derived
//! behaviors, relays, and plain callbacks. Each one is identified by a
//! [`SubscriberId`] and kept registered for as long as its
//! [`ReactiveHandle`] lives.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Observer, Ranked};

/// Unique identifier for a subscriber.
///
/// Registries key their entries by this ID, so the same observer can be
/// found again on deregistration without comparing trait-object pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter so IDs stay unique even if several threads
    /// each run their own graph.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered listener.
///
/// Dropping this handle deregisters the listener. This is the only way a
/// consumer releases what it subscribed to, so keep the handle alive for as
/// long as updates are wanted.
#[must_use = "dropping the handle unsubscribes immediately"]
pub struct ReactiveHandle {
    detach: Option<Box<dyn FnOnce()>>,
}

impl ReactiveHandle {
    /// Create a handle that runs `detach` exactly once when released.
    pub fn new<F>(detach: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Release the subscription now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ReactiveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveHandle")
            .field("active", &self.detach.is_some())
            .finish()
    }
}

/// An observer that forwards every pushed value to a callback.
pub struct CallbackObserver<A> {
    id: SubscriberId,
    rank: Cell<u32>,
    notify: Box<dyn Fn(A)>,
}

impl<A> CallbackObserver<A> {
    /// Create a new observer with the given callback.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn(A) + 'static,
    {
        Self {
            id: SubscriberId::new(),
            rank: Cell::new(0),
            notify: Box::new(notify),
        }
    }

    /// Get the observer's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl<A> Ranked for CallbackObserver<A> {
    fn rank(&self) -> u32 {
        self.rank.get()
    }

    fn raise_rank(&self, above: u32) {
        if self.rank.get() <= above {
            self.rank.set(above + 1);
        }
    }
}

impl<A> Observer<A> for CallbackObserver<A> {
    fn push(&self, value: A) {
        (self.notify)(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn callback_observer_forwards_pushes() {
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();

        let observer = CallbackObserver::new(move |v: i32| seen_clone.set(v));
        observer.push(7);
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn callback_observer_rank_only_grows() {
        let observer = CallbackObserver::new(|_: i32| {});
        observer.raise_rank(4);
        assert_eq!(observer.rank(), 5);

        observer.raise_rank(1);
        assert_eq!(observer.rank(), 5);
    }

    #[test]
    fn handle_detaches_once() {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();

        let handle = ReactiveHandle::new(move || count_clone.set(count_clone.get() + 1));
        handle.unsubscribe();
        assert_eq!(count.get(), 1);

        let count_clone = count.clone();
        {
            let _handle = ReactiveHandle::new(move || count_clone.set(count_clone.get() + 1));
        }
        assert_eq!(count.get(), 2);
    }
}
