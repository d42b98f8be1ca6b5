//! Behaviors of futures: snapshots and `when`.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::activation::{stateful, stateless, weak_observer, BehaviorLink, Dependencies};
use super::{Behavior, BehaviorNode};
use crate::error::Result;
use crate::graph::{EvalState, NodeCore};
use crate::reactive::{Future, Observer, Ranked, ReactiveHandle, SubscriberId};

pub(crate) struct SnapshotNode<A> {
    core: NodeCore<Future<A>>,
    me: Weak<Self>,
    parent: Behavior<A>,
    current: RefCell<Future<A>>,
    fired: Cell<bool>,
    trigger: RefCell<Option<ReactiveHandle>>,
    listening: RefCell<Option<ReactiveHandle>>,
}

impl<A: Clone + 'static> SnapshotNode<A> {
    /// The trigger occurred: resolve the pending future with the parent's
    /// value and start following the parent.
    fn fire(&self) {
        if self.fired.replace(true) {
            return;
        }
        let pending = self.current.borrow().clone();
        match self.parent.try_at() {
            Ok(value) => {
                if let Err(err) = pending.resolve(value) {
                    tracing::warn!(node = self.core.id().raw(), %err, "snapshot future was resolved before its trigger");
                }
            }
            Err(err) => {
                tracing::error!(node = self.core.id().raw(), %err, "cannot snapshot behavior");
            }
        }
        let trigger = self.trigger.borrow_mut().take();
        drop(trigger);
        self.listen_to_parent();
    }

    fn listen_to_parent(&self) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        let id = self.core.id();
        let observer: Rc<dyn Observer<A>> = me;
        let state = self.parent.add_listener(id, &observer);
        drop(observer);

        let parent = self.parent.clone();
        let previous = self
            .listening
            .replace(Some(ReactiveHandle::new(move || parent.remove_listener(id))));
        drop(previous);
        self.follow_parent(state);
    }

    fn follow_parent(&self, state: EvalState) {
        if state == EvalState::Push {
            let current = self.current.borrow().clone();
            self.core.adopt(EvalState::Push, current);
        } else {
            self.core.set_state(state);
        }
    }
}

impl<A: Clone + 'static> Ranked for SnapshotNode<A> {
    fn rank(&self) -> u32 {
        self.core.rank()
    }

    fn raise_rank(&self, above: u32) {
        self.core.raise_rank(above);
    }
}

// Changes of the parent, once the trigger has occurred.
impl<A: Clone + 'static> Observer<A> for SnapshotNode<A> {
    fn push(&self, value: A) {
        let fresh = Future::of(value);
        let previous = self.current.replace(fresh.clone());
        drop(previous);
        self.core.publish(fresh);
    }

    fn change_state_down(&self, state: EvalState) {
        if state == EvalState::Push {
            match self.parent.try_at() {
                Ok(value) => {
                    let previous = self.current.replace(Future::of(value));
                    drop(previous);
                }
                Err(err) => {
                    tracing::error!(node = self.core.id().raw(), %err, "cannot snapshot behavior");
                }
            }
        }
        self.follow_parent(state);
        self.core.forward_state(self.core.state());
    }
}

impl<A: Clone + 'static> BehaviorNode<Future<A>> for SnapshotNode<A> {
    fn core(&self) -> &NodeCore<Future<A>> {
        &self.core
    }

    fn pull(&self) -> Result<Future<A>> {
        if self.fired.get() && self.core.state() != EvalState::Push {
            return Ok(Future::of(self.parent.try_at()?));
        }
        Ok(self.current.borrow().clone())
    }

    fn activate(&self) {
        stateful::activate(self);
    }

    fn deactivate(&self) {
        stateful::deactivate(self);
    }
}

/// The value of `behavior` at the moment `trigger` occurs.
///
/// Until then the result holds a pending future that resolves when the
/// trigger does. Afterwards it holds an already resolved future for every
/// new value of `behavior`. A trigger that has already occurred resolves
/// immediately.
pub fn snapshot_at<A, T>(behavior: &Behavior<A>, trigger: &Future<T>) -> Behavior<Future<A>>
where
    A: Clone + 'static,
    T: Clone + 'static,
{
    let pending = Future::sink();
    let core = NodeCore::new("snapshot");
    core.adopt(EvalState::Push, pending.clone());
    let node = Rc::new_cyclic(|me| SnapshotNode {
        core,
        me: Weak::clone(me),
        parent: behavior.clone(),
        current: RefCell::new(pending),
        fired: Cell::new(false),
        trigger: RefCell::new(None),
        listening: RefCell::new(None),
    });

    let weak = Rc::downgrade(&node);
    let handle = trigger.subscribe(move |_| {
        if let Some(node) = weak.upgrade() {
            node.fire();
        }
    });
    if !node.fired.get() {
        *node.trigger.borrow_mut() = Some(handle);
    }
    Behavior::from_node(node)
}

pub(crate) struct WhenNode {
    core: NodeCore<Future<()>>,
    parent: Behavior<bool>,
    deps: Dependencies,
}

impl WhenNode {
    fn future_for(&self, value: bool) -> Future<()> {
        if value {
            return Future::of(());
        }
        let pending = Future::sink();
        let resolve = pending.resolver();
        let watcher = self.parent.subscribe(move |now_true| {
            if now_true {
                resolve(());
            }
        });
        pending.hold(watcher);
        pending
    }
}

impl Ranked for WhenNode {
    fn rank(&self) -> u32 {
        self.core.rank()
    }

    fn raise_rank(&self, above: u32) {
        self.core.raise_rank(above);
    }
}

impl Observer<bool> for WhenNode {
    fn push(&self, value: bool) {
        if self.core.state() == EvalState::Push {
            self.core.publish(self.future_for(value));
        }
    }

    fn change_state_down(&self, _state: EvalState) {
        stateless::refresh(self, &self.deps);
    }
}

impl BehaviorNode<Future<()>> for WhenNode {
    fn core(&self) -> &NodeCore<Future<()>> {
        &self.core
    }

    fn pull(&self) -> Result<Future<()>> {
        Ok(self.future_for(self.parent.try_at()?))
    }

    fn activate(&self) {
        stateless::activate(self, &self.deps);
    }

    fn deactivate(&self) {
        stateless::deactivate(self, &self.deps);
    }

    fn change_pullers(&self, delta: isize) {
        stateless::change_pullers(self, &self.deps, delta);
    }
}

/// A future that has occurred while `condition` is true, and that occurs at
/// its next transition to true while it is false.
pub fn when(condition: &Behavior<bool>) -> Behavior<Future<()>> {
    let id = SubscriberId::new();
    let node = Rc::new_cyclic(|me| WhenNode {
        core: NodeCore::with_id(id, "when"),
        parent: condition.clone(),
        deps: Dependencies::one(BehaviorLink::new(condition.clone(), weak_observer(me), id)),
    });
    Behavior::from_node(node)
}
