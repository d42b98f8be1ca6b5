//! Monadic bind.
//!
//! `outer.chain(f)` behaves like `f(outer.at())`, re-evaluated whenever the
//! outer behavior changes. The chain listens to the outer behavior through a
//! relay, so its own registration on the current inner behavior is never
//! confused with the outer one.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::{Behavior, BehaviorNode};
use crate::error::Result;
use crate::graph::{EvalState, NodeCore};
use crate::reactive::{Observer, Ranked, SubscriberId};

pub(crate) struct ChainNode<A, B> {
    core: NodeCore<B>,
    me: Weak<Self>,
    outer: Behavior<A>,
    f: Box<dyn Fn(A) -> Behavior<B>>,
    relay: Rc<ChainRelay<A, B>>,
    inner: RefCell<Option<Behavior<B>>>,
}

impl<A: Clone + 'static, B: Clone + 'static> ChainNode<A, B> {
    fn new(outer: &Behavior<A>, f: Box<dyn Fn(A) -> Behavior<B>>) -> Rc<Self> {
        Rc::new_cyclic(|me: &Weak<Self>| Self {
            core: NodeCore::new("chain"),
            me: me.clone(),
            outer: outer.clone(),
            f,
            relay: Rc::new(ChainRelay {
                id: SubscriberId::new(),
                rank: Cell::new(0),
                chain: me.clone(),
            }),
            inner: RefCell::new(None),
        })
    }

    /// Compute the inner behavior for `value`, listen to it and adopt its
    /// state.
    fn attach_inner(&self, value: A) -> EvalState {
        let inner = (self.f)(value);
        let state = match self.me.upgrade() {
            Some(me) => {
                let observer: Rc<dyn Observer<B>> = me;
                inner.add_listener(self.core.id(), &observer)
            }
            None => inner.state(),
        };
        let state = self.adopt(&inner, state);
        let previous = self.inner.replace(Some(inner));
        drop(previous);
        state
    }

    fn adopt(&self, inner: &Behavior<B>, state: EvalState) -> EvalState {
        if state != EvalState::Push {
            self.core.set_state(state);
            return state;
        }
        match inner.try_at() {
            Ok(value) => {
                self.core.adopt(EvalState::Push, value);
                EvalState::Push
            }
            Err(err) => {
                tracing::error!(node = self.core.id().raw(), %err, "inner behavior cannot be sampled");
                self.core.set_state(EvalState::Pull);
                EvalState::Pull
            }
        }
    }

    fn release_inner(&self) {
        let previous = self.inner.borrow_mut().take();
        if let Some(inner) = previous {
            inner.remove_listener(self.core.id());
        }
    }

    fn push_outer(&self, value: A) {
        if self.core.listener_count() == 0 {
            return;
        }
        self.release_inner();
        let state = self.attach_inner(value);
        tracing::trace!(node = self.core.id().raw(), ?state, "switched inner behavior");
        self.core.forward_state(state);
        if let Some(current) = self.core.cached() {
            self.core.emit(current);
        }
    }

    fn outer_state_changed(&self, state: EvalState) {
        if self.core.listener_count() == 0 {
            return;
        }
        if state == EvalState::Push {
            if self.inner.borrow().is_some() {
                return;
            }
            let state = match self.outer.try_at() {
                Ok(value) => self.attach_inner(value),
                Err(err) => {
                    tracing::error!(node = self.core.id().raw(), %err, "outer behavior cannot be sampled");
                    return;
                }
            };
            self.core.forward_state(state);
        } else {
            self.release_inner();
            self.core.set_state(state);
            self.core.forward_state(state);
        }
    }
}

impl<A: Clone + 'static, B: Clone + 'static> Ranked for ChainNode<A, B> {
    fn rank(&self) -> u32 {
        self.core.rank()
    }

    fn raise_rank(&self, above: u32) {
        self.core.raise_rank(above);
    }
}

// Pushes and state changes from the current inner behavior.
impl<A: Clone + 'static, B: Clone + 'static> Observer<B> for ChainNode<A, B> {
    fn push(&self, value: B) {
        self.core.publish(value);
    }

    fn change_state_down(&self, state: EvalState) {
        let inner = self.inner.borrow().clone();
        if let Some(inner) = inner {
            let state = self.adopt(&inner, state);
            self.core.forward_state(state);
        }
    }
}

impl<A: Clone + 'static, B: Clone + 'static> BehaviorNode<B> for ChainNode<A, B> {
    fn core(&self) -> &NodeCore<B> {
        &self.core
    }

    /// Recomputes the inner behavior on every call. Nothing is cached.
    fn pull(&self) -> Result<B> {
        let value = self.outer.try_at()?;
        (self.f)(value).try_at()
    }

    fn activate(&self) {
        let relay: Rc<dyn Observer<A>> = self.relay.clone();
        let state = self.outer.add_listener(self.relay.id, &relay);
        if state != EvalState::Push {
            self.core.set_state(state);
            return;
        }
        match self.outer.try_at() {
            Ok(value) => {
                self.attach_inner(value);
            }
            Err(err) => {
                tracing::error!(node = self.core.id().raw(), %err, "outer behavior cannot be sampled");
                self.core.set_state(EvalState::Pull);
            }
        }
    }

    fn deactivate(&self) {
        self.outer.remove_listener(self.relay.id);
        self.release_inner();
        self.core.set_state(EvalState::Inactive);
    }

    fn change_pullers(&self, delta: isize) {
        self.core.adjust_pullers(delta);
        self.outer.change_pullers(delta);
    }
}

/// Listens to the outer behavior on behalf of the chain.
struct ChainRelay<A, B> {
    id: SubscriberId,
    rank: Cell<u32>,
    chain: Weak<ChainNode<A, B>>,
}

impl<A: Clone + 'static, B: Clone + 'static> Ranked for ChainRelay<A, B> {
    fn rank(&self) -> u32 {
        self.rank.get()
    }

    fn raise_rank(&self, above: u32) {
        if self.rank.get() <= above {
            self.rank.set(above + 1);
        }
        if let Some(chain) = self.chain.upgrade() {
            chain.raise_rank(self.rank.get());
        }
    }
}

impl<A: Clone + 'static, B: Clone + 'static> Observer<A> for ChainRelay<A, B> {
    fn push(&self, value: A) {
        if let Some(chain) = self.chain.upgrade() {
            chain.push_outer(value);
        }
    }

    fn change_state_down(&self, state: EvalState) {
        if let Some(chain) = self.chain.upgrade() {
            chain.outer_state_changed(state);
        }
    }
}

impl<A: Clone + 'static> Behavior<A> {
    /// Monadic bind: a behavior that acts like `f` applied to this
    /// behavior's current value.
    pub fn chain<B, F>(&self, f: F) -> Behavior<B>
    where
        B: Clone + 'static,
        F: Fn(A) -> Behavior<B> + 'static,
    {
        Behavior::from_node(ChainNode::new(self, Box::new(f)))
    }
}

impl<A: Clone + 'static> Behavior<Behavior<A>> {
    /// Collapse a behavior of behaviors into the current inner one.
    pub fn flatten(&self) -> Behavior<A> {
        self.chain(|inner| inner)
    }
}
