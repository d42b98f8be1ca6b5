//! Behaviors driven by discrete streams.

use std::cell::RefCell;
use std::rc::Rc;

use super::activation::{stateful, stateless, weak_observer, Dependencies, StreamLink};
use super::{from_function, Behavior, BehaviorNode};
use crate::error::Result;
use crate::graph::{EvalState, NodeCore};
use crate::reactive::{Observer, Ranked, ReactiveHandle, Stream, SubscriberId};

pub(crate) struct StepperNode<A> {
    core: NodeCore<A>,
    value: RefCell<A>,
    deps: Dependencies,
}

impl<A: Clone + 'static> Ranked for StepperNode<A> {
    fn rank(&self) -> u32 {
        self.core.rank()
    }

    fn raise_rank(&self, above: u32) {
        self.core.raise_rank(above);
    }
}

impl<A: Clone + 'static> Observer<A> for StepperNode<A> {
    fn push(&self, value: A) {
        let previous = self.value.replace(value.clone());
        drop(previous);
        self.core.publish(value);
    }
}

impl<A: Clone + 'static> BehaviorNode<A> for StepperNode<A> {
    fn core(&self) -> &NodeCore<A> {
        &self.core
    }

    fn pull(&self) -> Result<A> {
        Ok(self.value.borrow().clone())
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

/// Hold `initial`, then the latest occurrence of `steps`.
///
/// Occurrences are only seen while the stepper has listeners.
pub fn stepper<A: Clone + 'static>(initial: A, steps: &Stream<A>) -> Behavior<A> {
    let id = SubscriberId::new();
    let node = Rc::new_cyclic(|me| StepperNode {
        core: NodeCore::with_id(id, "stepper"),
        value: RefCell::new(initial),
        deps: Dependencies::one(StreamLink::new(steps.clone(), weak_observer(me), id)),
    });
    Behavior::from_node(node)
}

/// A boolean that turns on with `on` and off with `off`.
pub fn toggle<X, Y>(initial: bool, on: &Stream<X>, off: &Stream<Y>) -> Behavior<bool>
where
    X: Clone + 'static,
    Y: Clone + 'static,
{
    stepper(initial, &on.map_to(true).combine(&off.map_to(false)))
}

pub(crate) struct ScanNode<A, B> {
    core: NodeCore<B>,
    value: RefCell<B>,
    f: Rc<dyn Fn(A, B) -> B>,
    subscription: RefCell<Option<ReactiveHandle>>,
}

impl<A: Clone + 'static, B: Clone + 'static> ScanNode<A, B> {
    fn new(f: Rc<dyn Fn(A, B) -> B>, initial: B, source: &Stream<A>) -> Rc<Self> {
        let core = NodeCore::new("scan");
        core.adopt(EvalState::Push, initial.clone());
        let node = Rc::new(Self {
            core,
            value: RefCell::new(initial),
            f,
            subscription: RefCell::new(None),
        });

        let id = node.core.id();
        let observer: Rc<dyn Observer<A>> = node.clone();
        source.add_listener(id, &observer);
        drop(observer);
        let source = source.clone();
        let handle = ReactiveHandle::new(move || {
            source.remove_listener(id);
        });
        *node.subscription.borrow_mut() = Some(handle);
        node
    }
}

impl<A: Clone + 'static, B: Clone + 'static> Ranked for ScanNode<A, B> {
    fn rank(&self) -> u32 {
        self.core.rank()
    }

    fn raise_rank(&self, above: u32) {
        self.core.raise_rank(above);
    }
}

impl<A: Clone + 'static, B: Clone + 'static> Observer<A> for ScanNode<A, B> {
    fn push(&self, value: A) {
        let accumulated = self.value.borrow().clone();
        let next = (self.f)(value, accumulated);
        let previous = self.value.replace(next.clone());
        drop(previous);
        self.core.publish(next);
    }
}

impl<A: Clone + 'static, B: Clone + 'static> BehaviorNode<B> for ScanNode<A, B> {
    fn core(&self) -> &NodeCore<B> {
        &self.core
    }

    fn pull(&self) -> Result<B> {
        Ok(self.value.borrow().clone())
    }

    fn activate(&self) {
        stateful::activate(self);
    }

    fn deactivate(&self) {
        stateful::deactivate(self);
    }
}

/// Fold `f` over the occurrences of `source`, starting from `initial`.
///
/// Sampling the outer behavior starts a fresh accumulator, which counts
/// every occurrence from then on whether or not it is observed.
pub fn scan<A, B, F>(f: F, initial: B, source: &Stream<A>) -> Behavior<Behavior<B>>
where
    A: Clone + 'static,
    B: Clone + 'static,
    F: Fn(A, B) -> B + 'static,
{
    let f: Rc<dyn Fn(A, B) -> B> = Rc::new(f);
    let source = source.clone();
    from_function(move || Behavior::from_node(ScanNode::new(Rc::clone(&f), initial.clone(), &source)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepper_holds_the_latest_occurrence() {
        let steps = Stream::new();
        let b = stepper(0, &steps);
        let _handle = b.subscribe(|_| {});

        assert_eq!(b.at(), 0);
        steps.push(1);
        assert_eq!(b.at(), 1);
        steps.push(2);
        assert_eq!(b.at(), 2);
    }

    #[test]
    fn stepper_releases_the_stream() {
        let steps: Stream<i32> = Stream::new();
        let b = stepper(0, &steps);
        let handle = b.subscribe(|_| {});
        assert_eq!(steps.listener_count(), 1);
        drop(handle);
        assert_eq!(steps.listener_count(), 0);
    }

    #[test]
    fn scan_accumulates_while_unobserved() {
        let source = Stream::new();
        let sum = scan(|n: i32, acc: i32| acc + n, 0, &source).at();

        source.push(1);
        assert_eq!(sum.at(), 1);
        source.push(2);
        assert_eq!(sum.at(), 3);
        source.push(3);
        assert_eq!(sum.at(), 6);
    }

    #[test]
    fn scan_samples_are_independent() {
        let source = Stream::new();
        let counter = scan(|_: (), n: u32| n + 1, 0, &source);
        let early = counter.at();
        source.push(());
        let late = counter.at();
        source.push(());
        assert_eq!((early.at(), late.at()), (2, 1));

        drop(early);
        drop(late);
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn toggle_follows_both_streams() {
        let on: Stream<()> = Stream::new();
        let off: Stream<&str> = Stream::new();
        let lamp = toggle(false, &on, &off);
        let _handle = lamp.subscribe(|_| {});

        on.push(());
        assert!(lamp.at());
        off.push("now");
        assert!(!lamp.at());
    }
}
