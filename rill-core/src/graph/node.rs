//! Graph Nodes
//!
//! This module defines the bookkeeping every behavior node carries: its
//! evaluation state, its cache, its listeners and pullers, and its rank.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::scheduler;
use crate::reactive::{ListenerRegistry, Observer, SubscriberId};

/// How a node currently propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EvalState {
    /// Not observed. The cache is invalid.
    #[default]
    Inactive,

    /// Observed passively. Values are recomputed on every read.
    Pull,

    /// Actively observed. The cache is authoritative and changes are pushed.
    Push,

    /// Permanently pull-based, e.g. continuous time.
    OnlyPull,
}

impl EvalState {
    /// Whether readers must sample rather than wait for pushes.
    pub fn is_pulling(self) -> bool {
        matches!(self, EvalState::Pull | EvalState::OnlyPull)
    }
}

/// Last value of a node, valid only while the node is in push mode.
#[derive(Debug, Clone)]
pub(crate) enum Cache<A> {
    Valid(A),
    Invalid,
}

/// A serializable snapshot of a node's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    /// The node's subscriber ID.
    pub id: SubscriberId,
    /// Node kind, e.g. `"map"` or `"chain"`.
    pub kind: &'static str,
    /// Current evaluation state.
    pub state: EvalState,
    /// Active observers.
    pub listeners: usize,
    /// Passive samplers.
    pub pullers: usize,
    /// Propagation rank.
    pub rank: u32,
}

/// State shared by every behavior node.
pub(crate) struct NodeCore<A> {
    id: SubscriberId,
    kind: &'static str,
    state: Cell<EvalState>,
    cache: RefCell<Cache<A>>,
    pullers: Cell<usize>,
    rank: Cell<u32>,
    listeners: RefCell<ListenerRegistry<A>>,
}

impl<A> NodeCore<A> {
    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn kind(&self) -> &'static str {
        self.kind
    }

    pub(crate) fn state(&self) -> EvalState {
        self.state.get()
    }

    pub(crate) fn rank(&self) -> u32 {
        self.rank.get()
    }

    pub(crate) fn pullers(&self) -> usize {
        self.pullers.get()
    }

    /// Add `delta` to the puller count and return `(previous, current)`.
    pub(crate) fn adjust_pullers(&self, delta: isize) -> (usize, usize) {
        let previous = self.pullers.get();
        let current = match previous.checked_add_signed(delta) {
            Some(current) => current,
            None => {
                tracing::warn!(node = self.id.raw(), kind = self.kind, previous, delta, "puller count would go negative, clamping to zero");
                0
            }
        };
        self.pullers.set(current);
        (previous, current)
    }
}

impl<A: Clone + 'static> NodeCore<A> {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self::with_id(SubscriberId::new(), kind)
    }

    /// Create the core with an ID allocated up front, for nodes whose
    /// dependency links must know the ID before the node exists.
    pub(crate) fn with_id(id: SubscriberId, kind: &'static str) -> Self {
        Self {
            id,
            kind,
            state: Cell::new(EvalState::Inactive),
            cache: RefCell::new(Cache::Invalid),
            pullers: Cell::new(0),
            rank: Cell::new(0),
            listeners: RefCell::new(ListenerRegistry::new()),
        }
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Change state. Leaving push mode invalidates the cache.
    pub(crate) fn set_state(&self, state: EvalState) {
        let previous = self.state.replace(state);
        if state != EvalState::Push {
            let stale = self.cache.replace(Cache::Invalid);
            drop(stale);
        }
        if previous != state {
            tracing::trace!(node = self.id.raw(), kind = self.kind, ?previous, ?state, "state transition");
        }
    }

    /// Change state and, when entering push mode, seed the cache.
    pub(crate) fn adopt(&self, state: EvalState, value: A) {
        self.set_state(state);
        self.store(value);
    }

    /// The cached value, if the node is in push mode.
    pub(crate) fn cached(&self) -> Option<A> {
        if self.state.get() != EvalState::Push {
            return None;
        }
        match &*self.cache.borrow() {
            Cache::Valid(value) => Some(value.clone()),
            Cache::Invalid => None,
        }
    }

    /// Update the cache. Ignored outside push mode.
    pub(crate) fn store(&self, value: A) {
        if self.state.get() == EvalState::Push {
            let previous = self.cache.replace(Cache::Valid(value));
            drop(previous);
        }
    }

    /// Store `value` and schedule it for every listener.
    ///
    /// Returns `false` without doing anything when the node is not in push
    /// mode; pull-mode readers recompute on their own.
    pub(crate) fn publish(&self, value: A) -> bool {
        if self.state.get() != EvalState::Push {
            tracing::trace!(node = self.id.raw(), kind = self.kind, "dropping push outside push mode");
            return false;
        }
        self.store(value.clone());
        self.emit(value);
        true
    }

    /// Schedule `value` for every listener without touching the cache.
    pub(crate) fn emit(&self, value: A) {
        let targets = self.listeners.borrow().live();
        if targets.is_empty() {
            return;
        }
        scheduler::batch(|| {
            for (target, observer) in targets {
                scheduler::schedule(self.id, target, observer, value.clone());
            }
        });
    }

    /// Announce a state change to every listener.
    pub(crate) fn forward_state(&self, state: EvalState) {
        let targets = self.listeners.borrow().live();
        for (_, observer) in targets {
            observer.change_state_down(state);
        }
    }

    /// Keep the rank strictly above `above`, forwarding any raise downstream.
    pub(crate) fn raise_rank(&self, above: u32) {
        if self.rank.get() > above {
            return;
        }
        let rank = above + 1;
        self.rank.set(rank);
        let targets = self.listeners.borrow().live();
        for (_, observer) in targets {
            observer.raise_rank(rank);
        }
    }

    /// Register a listener and return the new count.
    pub(crate) fn register(&self, id: SubscriberId, observer: &Rc<dyn Observer<A>>) -> usize {
        self.listeners.borrow_mut().insert(id, observer)
    }

    /// Deregister a listener. `None` if it was never registered.
    pub(crate) fn deregister(&self, id: SubscriberId) -> Option<usize> {
        let remaining = self.listeners.borrow_mut().remove(id);
        if remaining.is_some() {
            scheduler::cancel(self.id, id);
        }
        remaining
    }

    pub(crate) fn stats(&self) -> NodeStats {
        NodeStats {
            id: self.id,
            kind: self.kind,
            state: self.state(),
            listeners: self.listener_count(),
            pullers: self.pullers(),
            rank: self.rank(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{CallbackObserver, Ranked};

    #[test]
    fn node_starts_inactive_without_cache() {
        let core: NodeCore<i32> = NodeCore::new("test");
        assert_eq!(core.state(), EvalState::Inactive);
        assert_eq!(core.cached(), None);
        assert_eq!(core.listener_count(), 0);
        assert_eq!(core.pullers(), 0);
    }

    #[test]
    fn cache_is_only_valid_in_push_mode() {
        let core = NodeCore::new("test");

        core.store(1);
        assert_eq!(core.cached(), None);

        core.adopt(EvalState::Push, 2);
        assert_eq!(core.cached(), Some(2));

        core.set_state(EvalState::Pull);
        assert_eq!(core.cached(), None);

        // Returning to push mode must not resurrect the old value.
        core.set_state(EvalState::Push);
        assert_eq!(core.cached(), None);
    }

    #[test]
    fn puller_count_never_goes_negative() {
        let core: NodeCore<i32> = NodeCore::new("test");
        assert_eq!(core.adjust_pullers(1), (0, 1));
        assert_eq!(core.adjust_pullers(-1), (1, 0));
        assert_eq!(core.adjust_pullers(-1), (0, 0));
    }

    #[test]
    fn raise_rank_reaches_listeners() {
        let core = NodeCore::new("test");
        let observer = Rc::new(CallbackObserver::new(|_: i32| {}));
        let id = observer.id();
        let erased: Rc<dyn Observer<i32>> = observer.clone();

        core.register(id, &erased);
        core.raise_rank(3);

        assert_eq!(core.rank(), 4);
        assert_eq!(observer.rank(), 5);
    }

    #[test]
    fn publish_requires_push_mode() {
        let core = NodeCore::new("test");
        assert!(!core.publish(5));

        core.adopt(EvalState::Push, 0);
        assert!(core.publish(5));
        assert_eq!(core.cached(), Some(5));
    }
}
