//! Behaviors
//!
//! A [`Behavior`] is a value that changes over time. Conceptually it is a
//! function from [`Time`] to a value; operationally it is a node in the
//! propagation graph that can either push changes to its listeners or be
//! sampled on demand.
//!
//! # Push and pull
//!
//! Each node is in one of four [`EvalState`]s:
//!
//! - `Inactive`: nobody observes it; reading recomputes.
//! - `Pull`: only passive samplers (pullers) need it; reading recomputes.
//! - `Push`: at least one listener needs every change; the cache is
//!   authoritative and reading is O(1).
//! - `OnlyPull`: the node changes continuously (time, integrals) and can
//!   only ever be sampled.
//!
//! # Activation
//!
//! Every node kind picks exactly one activation strategy from
//! [`activation`]:
//!
//! - stateless nodes (map, apply, stepper, ...) are active exactly while
//!   observed, and activate their dependencies recursively
//! - stateful nodes (constants, accumulators) are always active
//! - producer nodes own an external resource and run it while anyone,
//!   listener or puller, needs it
//!
//! # Example
//!
//! ```rust
//! use rill_core::{lift2, sink_behavior};
//!
//! let width = sink_behavior(3);
//! let height = sink_behavior(4);
//! let area = lift2(|w: i32, h: i32| w * h, &width, &height);
//!
//! assert_eq!(area.at(), 12);
//! width.push(5);
//! assert_eq!(area.at(), 20);
//! ```

mod activation;
mod chain;
mod constant;
mod discrete;
mod future_ops;
mod map;
mod producer;
mod switcher;
mod time;

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::{BehaviorError, Result};
use crate::graph::{EvalState, NodeCore, NodeStats};
use crate::reactive::{Observer, Ranked, Reactive, ReactiveHandle, ReactiveKind, SubscriberId};
use crate::Time;

pub use constant::constant;
pub use discrete::{scan, stepper, toggle};
pub use future_ops::{snapshot_at, when};
pub use map::{ap, lift2, lift3};
pub use producer::{producer_behavior, sink_behavior, Pusher, SinkBehavior};
pub use switcher::{switch_to, switcher};
pub use time::{from_function, integrate, test_behavior, time, time_from};

/// A pure function from time to value, used to check behaviors against
/// their meaning. Never run on the propagation path.
pub type SemanticFn<A> = Rc<dyn Fn(Time) -> A>;

/// A shareable function value, as carried by function-valued behaviors.
pub type Func<A, B> = Rc<dyn Fn(A) -> B>;

/// The evaluation protocol every node kind implements.
///
/// `push` arrives separately, through [`Observer`], from whatever the node
/// depends on.
pub(crate) trait BehaviorNode<A> {
    fn core(&self) -> &NodeCore<A>;

    /// Recompute the current value on demand.
    fn pull(&self) -> Result<A>;

    /// Subscribe to dependencies. Called when the first listener arrives.
    fn activate(&self) {
        panic!(
            "{} behavior cannot activate: the node kind did not choose an activation strategy",
            self.core().kind()
        );
    }

    /// Unsubscribe from dependencies. Called when the last listener leaves.
    fn deactivate(&self) {
        panic!(
            "{} behavior cannot deactivate: the node kind did not choose an activation strategy",
            self.core().kind()
        );
    }

    fn change_pullers(&self, delta: isize) {
        self.core().adjust_pullers(delta);
    }

    fn semantic(&self) -> Result<SemanticFn<A>> {
        Err(BehaviorError::NoSemantic(self.core().kind()))
    }
}

/// A time-varying value.
///
/// Cloning a behavior yields another handle to the same node.
pub struct Behavior<A> {
    node: Rc<dyn BehaviorNode<A>>,
}

impl<A> Clone for Behavior<A> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<A: Clone + 'static> Behavior<A> {
    pub(crate) fn from_node<N: BehaviorNode<A> + 'static>(node: Rc<N>) -> Self {
        Self { node }
    }

    /// A behavior that always has `value`.
    pub fn of(value: A) -> Self {
        constant(value)
    }

    /// The node's subscriber ID.
    pub fn id(&self) -> SubscriberId {
        self.node.core().id()
    }

    /// The current value.
    ///
    /// O(1) while the behavior is in push mode, otherwise recomputed.
    ///
    /// # Panics
    ///
    /// Panics if the behavior cannot be sampled (see [`Behavior::try_at`]).
    pub fn at(&self) -> A {
        match self.try_at() {
            Ok(value) => value,
            Err(err) => panic!("cannot sample behavior: {err}"),
        }
    }

    /// The current value, or an error for behaviors that cannot be sampled.
    pub fn try_at(&self) -> Result<A> {
        match self.node.core().cached() {
            Some(value) => Ok(value),
            None => self.node.pull(),
        }
    }

    pub fn state(&self) -> EvalState {
        self.node.core().state()
    }

    pub fn listener_count(&self) -> usize {
        self.node.core().listener_count()
    }

    pub fn puller_count(&self) -> usize {
        self.node.core().pullers()
    }

    pub fn rank(&self) -> u32 {
        self.node.core().rank()
    }

    /// A snapshot of the node's bookkeeping, serializable with serde.
    pub fn stats(&self) -> NodeStats {
        self.node.core().stats()
    }

    /// The behavior's meaning as a function of time.
    pub fn semantic(&self) -> Result<SemanticFn<A>> {
        self.node.semantic()
    }

    /// Register or withdraw passive demand.
    pub fn change_pullers(&self, delta: isize) {
        self.node.change_pullers(delta);
    }

    /// Register `observer` as a listener and return the behavior's state
    /// afterwards. The first listener activates the node.
    pub fn add_listener(&self, id: SubscriberId, observer: &Rc<dyn Observer<A>>) -> EvalState {
        let core = self.node.core();
        let count = core.register(id, observer);
        observer.raise_rank(core.rank());
        if count == 1 {
            tracing::debug!(node = core.id().raw(), kind = core.kind(), "activating");
            self.node.activate();
        }
        core.state()
    }

    /// Withdraw a listener. Removing the last one deactivates the node.
    pub fn remove_listener(&self, id: SubscriberId) {
        let core = self.node.core();
        match core.deregister(id) {
            Some(0) => {
                tracing::debug!(node = core.id().raw(), kind = core.kind(), "deactivating");
                self.node.deactivate();
            }
            Some(_) => {}
            None => {
                tracing::warn!(node = core.id().raw(), listener = id.raw(), "removing unknown behavior listener");
            }
        }
    }

    /// Call `f` with every pushed value until the handle is dropped.
    ///
    /// `f` is not called with the current value. While the behavior can
    /// only be pulled, nothing is pushed at all; use [`Behavior::observe`]
    /// to find out when that is the case.
    pub fn subscribe<F>(&self, f: F) -> ReactiveHandle
    where
        F: Fn(A) + 'static,
    {
        self.observe(f, || {}, || {})
    }

    /// Observe the behavior in both modes.
    ///
    /// `on_push` receives pushed values. While the behavior is in a pulling
    /// state the observation registers itself as a puller and calls
    /// `begin_pulling`; when pushes resume it withdraws and calls
    /// `end_pulling`. The caller is expected to sample with
    /// [`Behavior::at`] in between.
    pub fn observe<P, B, E>(&self, on_push: P, begin_pulling: B, end_pulling: E) -> ReactiveHandle
    where
        P: Fn(A) + 'static,
        B: Fn() + 'static,
        E: Fn() + 'static,
    {
        let observation = Rc::new(Observation {
            id: SubscriberId::new(),
            rank: Cell::new(0),
            source: self.clone(),
            pulling: Cell::new(false),
            on_push: Box::new(on_push),
            begin_pulling: Box::new(begin_pulling),
            end_pulling: Box::new(end_pulling),
        });
        let id = observation.id;
        let erased: Rc<dyn Observer<A>> = observation.clone();
        let state = self.add_listener(id, &erased);
        observation.follow(state);

        let source = self.clone();
        ReactiveHandle::new(move || {
            observation.stop();
            source.remove_listener(id);
            drop(erased);
        })
    }

    /// Log every pushed value at `info` level.
    pub fn log(&self, prefix: &str) -> ReactiveHandle
    where
        A: fmt::Debug,
    {
        let prefix = prefix.to_owned();
        let node = self.id().raw();
        self.subscribe(move |value| tracing::info!(node, "{prefix} {value:?}"))
    }
}

impl<A> Reactive for Behavior<A> {
    fn kind(&self) -> ReactiveKind {
        ReactiveKind::Behavior
    }
}

impl<A: Clone + 'static> fmt::Debug for Behavior<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.node.core();
        f.debug_struct("Behavior")
            .field("id", &core.id())
            .field("kind", &core.kind())
            .field("state", &core.state())
            .finish()
    }
}

/// Sample `behavior` now.
pub fn at<A: Clone + 'static>(behavior: &Behavior<A>) -> A {
    behavior.at()
}

/// A listener that also tracks whether it has to pull.
struct Observation<A> {
    id: SubscriberId,
    rank: Cell<u32>,
    source: Behavior<A>,
    pulling: Cell<bool>,
    on_push: Box<dyn Fn(A)>,
    begin_pulling: Box<dyn Fn()>,
    end_pulling: Box<dyn Fn()>,
}

impl<A: Clone + 'static> Observation<A> {
    fn follow(&self, state: EvalState) {
        if state.is_pulling() && !self.pulling.get() {
            self.pulling.set(true);
            self.source.change_pullers(1);
            (self.begin_pulling)();
        } else if state == EvalState::Push && self.pulling.get() {
            self.pulling.set(false);
            self.source.change_pullers(-1);
            (self.end_pulling)();
        }
    }

    fn stop(&self) {
        if self.pulling.replace(false) {
            self.source.change_pullers(-1);
            (self.end_pulling)();
        }
    }
}

impl<A> Ranked for Observation<A> {
    fn rank(&self) -> u32 {
        self.rank.get()
    }

    fn raise_rank(&self, above: u32) {
        if self.rank.get() <= above {
            self.rank.set(above + 1);
        }
    }
}

impl<A: Clone + 'static> Observer<A> for Observation<A> {
    fn push(&self, value: A) {
        (self.on_push)(value);
    }

    fn change_state_down(&self, state: EvalState) {
        self.follow(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Bare {
        core: NodeCore<i32>,
    }

    impl BehaviorNode<i32> for Bare {
        fn core(&self) -> &NodeCore<i32> {
            &self.core
        }

        fn pull(&self) -> Result<i32> {
            Ok(0)
        }
    }

    #[test]
    #[should_panic(expected = "did not choose an activation strategy")]
    fn nodes_without_a_strategy_cannot_activate() {
        let bare = Behavior::from_node(Rc::new(Bare {
            core: NodeCore::new("bare"),
        }));
        let _handle = bare.subscribe(|_| {});
    }

    #[test]
    fn semantic_is_unsupported_by_default() {
        let bare = Behavior::from_node(Rc::new(Bare {
            core: NodeCore::new("bare"),
        }));
        assert_eq!(bare.semantic().err(), Some(BehaviorError::NoSemantic("bare")));
        assert_eq!(bare.at(), 0);
    }

    #[test]
    fn observe_reports_pulling_phases() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let (begin, end) = (events.clone(), events.clone());
        let clock = from_function(|| 7);

        let handle = clock.observe(
            |_| {},
            move || begin.borrow_mut().push("begin"),
            move || end.borrow_mut().push("end"),
        );
        assert_eq!(clock.puller_count(), 1);

        drop(handle);
        assert_eq!(clock.puller_count(), 0);
        assert_eq!(*events.borrow(), vec!["begin", "end"]);
    }

    #[test]
    fn behaviors_are_reactive() {
        assert!(crate::reactive::is_behavior(&Behavior::of(1)));
        assert_eq!(at(&Behavior::of("x")), "x");
    }
}
