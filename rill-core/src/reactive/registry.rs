//! Listener registry.
//!
//! Tracks the observers of one reactive value in registration order and
//! counts them. The count is what drives activation: a value activates when
//! its count goes from zero to one and deactivates when it returns to zero.

use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::{Observer, SubscriberId};

struct Entry<A> {
    observer: Weak<dyn Observer<A>>,
    /// Registrations under this ID. Normally one; a node listening to the
    /// same upstream through two dependencies registers twice.
    count: usize,
}

/// Ordered, counted set of observers.
pub struct ListenerRegistry<A> {
    entries: IndexMap<SubscriberId, Entry<A>>,
    total: usize,
}

impl<A: 'static> ListenerRegistry<A> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            total: 0,
        }
    }

    /// Register `observer` under `id` and return the new listener count.
    pub fn insert(&mut self, id: SubscriberId, observer: &Rc<dyn Observer<A>>) -> usize {
        self.entries
            .entry(id)
            .and_modify(|entry| entry.count += 1)
            .or_insert_with(|| Entry {
                observer: Rc::downgrade(observer),
                count: 1,
            });
        self.total += 1;
        self.total
    }

    /// Deregister one registration of `id`.
    ///
    /// Returns the new listener count, or `None` if `id` was not registered.
    /// The count never goes below zero.
    pub fn remove(&mut self, id: SubscriberId) -> Option<usize> {
        let entry = self.entries.get_mut(&id)?;
        entry.count -= 1;
        if entry.count == 0 {
            // Keep the remaining observers in registration order.
            self.entries.shift_remove(&id);
        }
        self.total -= 1;
        Some(self.total)
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.total
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Snapshot of the observers that are still alive, in registration order.
    ///
    /// Callers deliver to the snapshot rather than the registry so observers
    /// may (de)register while a delivery is in progress.
    pub fn live(&self) -> Vec<(SubscriberId, Rc<dyn Observer<A>>)> {
        self.entries
            .iter()
            .filter_map(|(id, entry)| entry.observer.upgrade().map(|o| (*id, o)))
            .collect()
    }

    /// Remove every registration and return the live observers.
    pub fn drain(&mut self) -> Vec<(SubscriberId, Rc<dyn Observer<A>>)> {
        let live = self.live();
        self.entries.clear();
        self.total = 0;
        live
    }
}

impl<A: 'static> Default for ListenerRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::CallbackObserver;

    fn observer() -> (SubscriberId, Rc<dyn Observer<i32>>) {
        let observer = CallbackObserver::new(|_: i32| {});
        let id = observer.id();
        (id, Rc::new(observer))
    }

    #[test]
    fn counts_registrations() {
        let mut registry = ListenerRegistry::new();
        let (a, obs_a) = observer();
        let (b, obs_b) = observer();

        assert_eq!(registry.insert(a, &obs_a), 1);
        assert_eq!(registry.insert(b, &obs_b), 2);
        assert_eq!(registry.insert(a, &obs_a), 3);

        assert_eq!(registry.remove(a), Some(2));
        assert!(registry.contains(a));
        assert_eq!(registry.remove(a), Some(1));
        assert!(!registry.contains(a));
        assert_eq!(registry.remove(b), Some(0));
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_ids_never_go_negative() {
        let mut registry: ListenerRegistry<i32> = ListenerRegistry::new();
        assert_eq!(registry.remove(SubscriberId::new()), None);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn live_preserves_registration_order_and_skips_dropped() {
        let mut registry = ListenerRegistry::new();
        let (a, obs_a) = observer();
        let (b, obs_b) = observer();
        let (c, obs_c) = observer();

        registry.insert(a, &obs_a);
        registry.insert(b, &obs_b);
        registry.insert(c, &obs_c);
        registry.remove(b);
        drop(obs_c);

        let ids: Vec<_> = registry.live().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a]);
    }
}
