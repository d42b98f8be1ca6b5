//! Producer behaviors: sinks and user-defined producers.
//!
//! A producer runs its resource while it has listeners or pullers (see
//! [`super::activation`]). Values produced while nobody listens are kept so
//! the next sample sees them.

use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use super::activation::{producer, Producer};
use super::{Behavior, BehaviorNode};
use crate::error::Result;
use crate::graph::NodeCore;

pub(crate) struct SinkNode<A> {
    core: NodeCore<A>,
    value: RefCell<A>,
}

impl<A: Clone + PartialEq + 'static> SinkNode<A> {
    fn accept(&self, value: A) {
        if *self.value.borrow() == value {
            tracing::trace!(node = self.core.id().raw(), "sink value unchanged");
            return;
        }
        let previous = self.value.replace(value.clone());
        drop(previous);
        self.core.publish(value);
    }
}

// A sink has no resource of its own; only the state bookkeeping applies.
impl<A: Clone + 'static> Producer<A> for SinkNode<A> {
    fn start(&self) {}

    fn stop(&self) {}

    fn current(&self) -> A {
        self.value.borrow().clone()
    }
}

impl<A: Clone + 'static> BehaviorNode<A> for SinkNode<A> {
    fn core(&self) -> &NodeCore<A> {
        &self.core
    }

    fn pull(&self) -> Result<A> {
        Ok(self.current())
    }

    fn activate(&self) {
        producer::activate(self);
    }

    fn deactivate(&self) {
        producer::deactivate(self);
    }

    fn change_pullers(&self, delta: isize) {
        producer::change_pullers(self, delta);
    }
}

/// A behavior changed imperatively with [`SinkBehavior::push`].
///
/// Dereferences to the underlying [`Behavior`].
pub struct SinkBehavior<A> {
    node: Rc<SinkNode<A>>,
    behavior: Behavior<A>,
}

impl<A> Clone for SinkBehavior<A> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
            behavior: self.behavior.clone(),
        }
    }
}

impl<A: Clone + PartialEq + 'static> SinkBehavior<A> {
    /// Set a new value. Pushing the current value again does nothing.
    pub fn push(&self, value: A) {
        self.node.accept(value);
    }

    /// The behavior half, for code that only reads.
    pub fn behavior(&self) -> Behavior<A> {
        self.behavior.clone()
    }
}

impl<A> Deref for SinkBehavior<A> {
    type Target = Behavior<A>;

    fn deref(&self) -> &Behavior<A> {
        &self.behavior
    }
}

impl<A: Clone + 'static> fmt::Debug for SinkBehavior<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.behavior, f)
    }
}

/// Create a sink holding `initial`.
pub fn sink_behavior<A: Clone + PartialEq + 'static>(initial: A) -> SinkBehavior<A> {
    let node = Rc::new(SinkNode {
        core: NodeCore::new("sink"),
        value: RefCell::new(initial),
    });
    let behavior = Behavior::from_node(Rc::clone(&node));
    SinkBehavior { node, behavior }
}

type Teardown = Box<dyn FnOnce()>;

/// The push side handed to a producer's activation function.
pub struct Pusher<A> {
    target: Weak<FunctionProducer<A>>,
}

impl<A> Clone for Pusher<A> {
    fn clone(&self) -> Self {
        Self {
            target: Weak::clone(&self.target),
        }
    }
}

impl<A: Clone + 'static> Pusher<A> {
    /// Publish a new value. Ignored once the behavior is gone.
    pub fn push(&self, value: A) {
        if let Some(node) = self.target.upgrade() {
            node.accept(value);
        }
    }
}

pub(crate) struct FunctionProducer<A> {
    core: NodeCore<A>,
    value: RefCell<A>,
    start_fn: Box<dyn Fn(Pusher<A>) -> Teardown>,
    teardown: RefCell<Option<Teardown>>,
    me: Weak<Self>,
}

impl<A: Clone + 'static> FunctionProducer<A> {
    fn accept(&self, value: A) {
        let previous = self.value.replace(value.clone());
        drop(previous);
        self.core.publish(value);
    }
}

impl<A: Clone + 'static> Producer<A> for FunctionProducer<A> {
    fn start(&self) {
        let teardown = (self.start_fn)(Pusher {
            target: self.me.clone(),
        });
        let stale = self.teardown.replace(Some(teardown));
        if stale.is_some() {
            tracing::warn!(node = self.core.id().raw(), "producer started twice, discarding old teardown");
        }
    }

    fn stop(&self) {
        let teardown = self.teardown.take();
        match teardown {
            Some(teardown) => teardown(),
            None => tracing::warn!(node = self.core.id().raw(), "producer stopped without running"),
        }
    }

    fn current(&self) -> A {
        self.value.borrow().clone()
    }
}

impl<A: Clone + 'static> BehaviorNode<A> for FunctionProducer<A> {
    fn core(&self) -> &NodeCore<A> {
        &self.core
    }

    fn pull(&self) -> Result<A> {
        Ok(self.current())
    }

    fn activate(&self) {
        producer::activate(self);
    }

    fn deactivate(&self) {
        producer::deactivate(self);
    }

    fn change_pullers(&self, delta: isize) {
        producer::change_pullers(self, delta);
    }
}

impl<A> Drop for FunctionProducer<A> {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.get_mut().take() {
            teardown();
        }
    }
}

/// A behavior backed by an external resource.
///
/// `start` is called when the behavior gains its first listener or puller.
/// It receives a [`Pusher`] for publishing values and returns the teardown,
/// which is called when demand ends. Until the first push the behavior holds
/// `initial`.
///
/// ```rust
/// use std::{cell::Cell, rc::Rc};
/// use rill_core::producer_behavior;
///
/// let running = Rc::new(Cell::new(false));
/// let flag = running.clone();
/// let b = producer_behavior(
///     move |push| {
///         flag.set(true);
///         push.push(1);
///         let flag = flag.clone();
///         move || flag.set(false)
///     },
///     0,
/// );
///
/// let handle = b.subscribe(|_| {});
/// assert!(running.get());
/// assert_eq!(b.at(), 1);
/// drop(handle);
/// assert!(!running.get());
/// ```
pub fn producer_behavior<A, S, T>(start: S, initial: A) -> Behavior<A>
where
    A: Clone + 'static,
    S: Fn(Pusher<A>) -> T + 'static,
    T: FnOnce() + 'static,
{
    let node = Rc::new_cyclic(|me| FunctionProducer {
        core: NodeCore::new("producer"),
        value: RefCell::new(initial),
        start_fn: Box::new(move |pusher| -> Teardown { Box::new(start(pusher)) }),
        teardown: RefCell::new(None),
        me: me.clone(),
    });
    Behavior::from_node(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EvalState;
    use std::cell::Cell;

    fn counted() -> (Behavior<i32>, Pusher<i32>, Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let starts = Rc::new(Cell::new(0));
        let stops = Rc::new(Cell::new(0));
        let pusher = Rc::new(RefCell::new(None));
        let (s, t, p) = (starts.clone(), stops.clone(), pusher.clone());
        let b = producer_behavior(
            move |push: Pusher<i32>| {
                s.set(s.get() + 1);
                *p.borrow_mut() = Some(push);
                let t = t.clone();
                move || t.set(t.get() + 1)
            },
            0,
        );
        // Start once to capture the pusher, then reset the counters.
        b.change_pullers(1);
        b.change_pullers(-1);
        starts.set(0);
        stops.set(0);
        let pusher = pusher.borrow_mut().take().unwrap();
        (b, pusher, starts, stops)
    }

    #[test]
    fn sink_deduplicates() {
        let sink = sink_behavior(1);
        let pushes = Rc::new(Cell::new(0));
        let pushes_clone = pushes.clone();
        let _handle = sink.subscribe(move |_| pushes_clone.set(pushes_clone.get() + 1));

        sink.push(1);
        assert_eq!(pushes.get(), 0);
        sink.push(2);
        sink.push(2);
        assert_eq!(pushes.get(), 1);
        assert_eq!(sink.at(), 2);
    }

    #[test]
    fn sink_keeps_values_while_unobserved() {
        let sink = sink_behavior("a");
        sink.push("b");
        assert_eq!(sink.state(), EvalState::Inactive);
        assert_eq!(sink.at(), "b");
    }

    #[test]
    fn producer_runs_while_listened_to() {
        let (b, pusher, starts, stops) = counted();

        let first = b.subscribe(|_| {});
        let second = b.subscribe(|_| {});
        assert_eq!((starts.get(), stops.get()), (1, 0));
        assert_eq!(b.state(), EvalState::Push);

        pusher.push(7);
        assert_eq!(b.at(), 7);

        drop(first);
        assert_eq!(stops.get(), 0);
        drop(second);
        assert_eq!((starts.get(), stops.get()), (1, 1));
        assert_eq!(b.state(), EvalState::Inactive);
    }

    #[test]
    fn producer_counts_pullers_and_listeners_together() {
        let (b, _pusher, starts, stops) = counted();

        b.change_pullers(1);
        assert_eq!(b.state(), EvalState::Pull);
        let handle = b.subscribe(|_| {});
        assert_eq!(b.state(), EvalState::Push);
        assert_eq!(starts.get(), 1);

        drop(handle);
        assert_eq!(b.state(), EvalState::Pull);
        assert_eq!(stops.get(), 0);

        b.change_pullers(-1);
        assert_eq!(b.state(), EvalState::Inactive);
        assert_eq!((starts.get(), stops.get()), (1, 1));
    }

    #[test]
    fn pushes_outside_push_mode_are_kept_for_sampling() {
        let (b, pusher, _starts, _stops) = counted();
        b.change_pullers(1);
        pusher.push(3);
        assert_eq!(b.at(), 3);
        b.change_pullers(-1);
    }
}
