//! Switching between behaviors.
//!
//! A switcher acts exactly like its current source behavior and replaces
//! the source when a signal delivers a new one. Its own identity never
//! changes, so downstream listeners stay subscribed across switches.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::activation::stateful;
use super::{from_function, Behavior, BehaviorNode};
use crate::error::Result;
use crate::graph::{EvalState, NodeCore};
use crate::reactive::{Future, Observer, Ranked, ReactiveHandle, Stream};

pub(crate) struct SwitcherNode<A> {
    core: NodeCore<A>,
    me: Weak<Self>,
    source: RefCell<Behavior<A>>,
    /// Registration on `source`.
    listening: RefCell<Option<ReactiveHandle>>,
    /// Subscription to whatever delivers replacement sources.
    signal: RefCell<Option<ReactiveHandle>>,
}

impl<A: Clone + 'static> SwitcherNode<A> {
    fn new(init: &Behavior<A>) -> Rc<Self> {
        let node = Rc::new_cyclic(|me| Self {
            core: NodeCore::new("switcher"),
            me: Weak::clone(me),
            source: RefCell::new(init.clone()),
            listening: RefCell::new(None),
            signal: RefCell::new(None),
        });
        let state = node.listen_to(init);
        node.adopt(init, state);
        node
    }

    fn listen_to(&self, source: &Behavior<A>) -> EvalState {
        let Some(me) = self.me.upgrade() else {
            return source.state();
        };
        let id = self.core.id();
        let observer: Rc<dyn Observer<A>> = me;
        let state = source.add_listener(id, &observer);
        drop(observer);

        let source = source.clone();
        let handle = ReactiveHandle::new(move || source.remove_listener(id));
        let previous = self.listening.replace(Some(handle));
        drop(previous);
        state
    }

    fn adopt(&self, source: &Behavior<A>, state: EvalState) -> EvalState {
        if state != EvalState::Push {
            self.core.set_state(state);
            return state;
        }
        match source.try_at() {
            Ok(value) => {
                self.core.adopt(EvalState::Push, value);
                EvalState::Push
            }
            Err(err) => {
                tracing::error!(node = self.core.id().raw(), %err, "switched-in behavior cannot be sampled");
                self.core.set_state(EvalState::Pull);
                EvalState::Pull
            }
        }
    }

    fn switch_source(&self, next: Behavior<A>) {
        tracing::debug!(node = self.core.id().raw(), next = next.id().raw(), "switching source");
        // Demand moves with the source. The new source is attached before
        // the old one is released so upstream shared by both keeps running.
        let pullers = isize::try_from(self.core.pullers()).unwrap_or(isize::MAX);
        if pullers > 0 {
            next.change_pullers(pullers);
        }
        let state = self.listen_to(&next);
        let old = self.source.replace(next.clone());
        if pullers > 0 {
            old.change_pullers(-pullers);
        }
        drop(old);

        let state = self.adopt(&next, state);
        self.core.forward_state(state);
        if let Some(current) = self.core.cached() {
            self.core.emit(current);
        }
    }

    fn hold(&self, signal: ReactiveHandle) {
        let previous = self.signal.replace(Some(signal));
        drop(previous);
    }
}

impl<A: Clone + 'static> Ranked for SwitcherNode<A> {
    fn rank(&self) -> u32 {
        self.core.rank()
    }

    fn raise_rank(&self, above: u32) {
        self.core.raise_rank(above);
    }
}

impl<A: Clone + 'static> Observer<A> for SwitcherNode<A> {
    fn push(&self, value: A) {
        self.core.publish(value);
    }

    fn change_state_down(&self, state: EvalState) {
        let source = self.source.borrow().clone();
        let state = self.adopt(&source, state);
        self.core.forward_state(state);
    }
}

impl<A: Clone + 'static> BehaviorNode<A> for SwitcherNode<A> {
    fn core(&self) -> &NodeCore<A> {
        &self.core
    }

    fn pull(&self) -> Result<A> {
        let source = self.source.borrow().clone();
        source.try_at()
    }

    fn activate(&self) {
        stateful::activate(self);
    }

    fn deactivate(&self) {
        stateful::deactivate(self);
    }

    fn change_pullers(&self, delta: isize) {
        self.core.adjust_pullers(delta);
        let source = self.source.borrow().clone();
        source.change_pullers(delta);
    }
}

fn switch_on<A: Clone + 'static>(node: &Rc<SwitcherNode<A>>) -> impl Fn(Behavior<A>) + 'static {
    let weak = Rc::downgrade(node);
    move |next| {
        if let Some(node) = weak.upgrade() {
            node.switch_source(next);
        }
    }
}

/// Act like `init` until `next` occurs, then like the behavior it carries.
pub fn switch_to<A: Clone + 'static>(init: &Behavior<A>, next: &Future<Behavior<A>>) -> Behavior<A> {
    let node = SwitcherNode::new(init);
    node.hold(next.subscribe(switch_on(&node)));
    Behavior::from_node(node)
}

/// Act like `init`, switching to every behavior `stream` carries.
///
/// Sampling the result starts a fresh switcher, which only sees
/// occurrences from that moment on.
pub fn switcher<A: Clone + 'static>(init: &Behavior<A>, stream: &Stream<Behavior<A>>) -> Behavior<Behavior<A>> {
    let init = init.clone();
    let stream = stream.clone();
    from_function(move || {
        let node = SwitcherNode::new(&init);
        node.hold(stream.subscribe(switch_on(&node)));
        Behavior::from_node(node)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{constant, lift2, producer_behavior, sink_behavior, Pusher};
    use std::cell::Cell;

    fn counted() -> (Behavior<i32>, Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let starts = Rc::new(Cell::new(0));
        let stops = Rc::new(Cell::new(0));
        let (s, t) = (starts.clone(), stops.clone());
        let b = producer_behavior(
            move |_push: Pusher<i32>| {
                s.set(s.get() + 1);
                let t = t.clone();
                move || t.set(t.get() + 1)
            },
            2,
        );
        (b, starts, stops)
    }

    /// Pulls a producer through a pull-only sibling, so the source is
    /// `OnlyPull` while the producer runs.
    fn half_pulled(producer: &Behavior<i32>) -> Behavior<i32> {
        lift2(|a: i32, b: i32| a + b, &from_function(|| 1), producer)
    }

    #[test]
    fn switch_to_switches_once() {
        let next = Future::sink();
        let switched = switch_to(&constant(1), &next);
        let pushes = Rc::new(RefCell::new(Vec::new()));
        let pushes_clone = pushes.clone();
        let _handle = switched.subscribe(move |v| pushes_clone.borrow_mut().push(v));
        assert_eq!(switched.at(), 1);

        next.resolve(constant(2)).unwrap();
        assert_eq!(switched.at(), 2);
        assert_eq!(*pushes.borrow(), vec![2]);
        assert!(next.resolve(constant(3)).is_err());
        assert_eq!(switched.at(), 2);
    }

    #[test]
    fn switching_moves_the_registration() {
        let first = sink_behavior(1);
        let second = sink_behavior(2);
        let next = Future::sink();
        let switched = switch_to(&first, &next);
        assert_eq!(first.listener_count(), 1);

        next.resolve(second.behavior()).unwrap();
        assert_eq!(first.listener_count(), 0);
        assert_eq!(second.listener_count(), 1);

        second.push(20);
        assert_eq!(switched.at(), 20);
    }

    #[test]
    fn switcher_follows_the_stream() {
        let stream = Stream::new();
        let outer = switcher(&constant(0), &stream);
        let current = outer.at();
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();
        let _handle = current.subscribe(move |v| seen_clone.set(v));

        stream.push(constant(1));
        assert_eq!(seen.get(), 1);
        stream.push(constant(2));
        assert_eq!(current.at(), 2);

        // A later sample starts over from the initial behavior.
        assert_eq!(outer.at().at(), 0);
    }

    #[test]
    fn switching_moves_pullers_to_the_new_source() {
        let (producer, starts, stops) = counted();
        let next = Future::sink();
        let switched = switch_to(&half_pulled(&producer), &next);
        let handle = switched.subscribe(|_| {});

        assert_eq!(switched.state(), EvalState::OnlyPull);
        assert_eq!(switched.at(), 3);
        assert_eq!(producer.puller_count(), 1);

        next.resolve(constant(5)).unwrap();
        assert_eq!(switched.state(), EvalState::Push);
        assert_eq!(producer.puller_count(), 0);
        assert_eq!(producer.state(), EvalState::Inactive);
        assert_eq!((starts.get(), stops.get()), (1, 1));

        drop(handle);
        assert_eq!(switched.puller_count(), 0);
    }

    #[test]
    fn switching_into_a_pulled_source_releases_it_on_drop() {
        let (producer, starts, stops) = counted();
        let next = Future::sink();
        let switched = switch_to(&constant(0), &next);
        let handle = switched.subscribe(|_| {});

        next.resolve(half_pulled(&producer)).unwrap();
        assert_eq!(switched.state(), EvalState::OnlyPull);
        assert_eq!(switched.puller_count(), 1);
        assert_eq!(producer.puller_count(), 1);

        drop(handle);
        assert_eq!(producer.puller_count(), 0);
        assert_eq!(stops.get(), 0);

        // The switcher itself still listens until it is dropped.
        drop(switched);
        assert_eq!(producer.state(), EvalState::Inactive);
        assert_eq!((starts.get(), stops.get()), (1, 1));
    }

    #[test]
    fn stream_switcher_keeps_demand_balanced() {
        let (producer, starts, stops) = counted();
        let stream = Stream::new();
        let current = switcher(&half_pulled(&producer), &stream).at();
        let handle = current.subscribe(|_| {});
        assert_eq!(producer.puller_count(), 1);

        stream.push(constant(7));
        assert_eq!(current.at(), 7);
        assert_eq!(producer.puller_count(), 0);
        assert_eq!((starts.get(), stops.get()), (1, 1));

        stream.push(half_pulled(&producer));
        assert_eq!(current.at(), 3);
        assert_eq!((starts.get(), producer.puller_count()), (2, 1));

        drop(handle);
        drop(current);
        assert_eq!(producer.puller_count(), 0);
        assert_eq!((starts.get(), stops.get()), (2, 2));
    }
}
