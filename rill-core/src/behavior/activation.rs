//! Activation Strategies
//!
//! Every node kind decides how it joins and leaves the live graph by
//! delegating `activate`, `deactivate` and `change_pullers` to one of the
//! three strategies here.
//!
//! # Stateless
//!
//! Active exactly while observed. On activation the node registers with each
//! dependency in order; it ends up in push mode only if every dependency
//! reports push mode, otherwise it takes the last non-push state reported.
//! Deactivation deregisters in the same order. Puller deltas are passed on
//! to behavior dependencies; streams have no value to sample and are
//! skipped.
//!
//! # Stateful
//!
//! Always active. Activation and deactivation do nothing.
//!
//! # Producer
//!
//! Owns an external resource that runs while anyone needs the value:
//!
//! ```text
//!              first puller                  first listener
//!   Inactive ---------------> Pull ------------------------> Push
//!      ^   <---------------    ^  <------------------------   |
//!      |      last puller      |   last listener, pullers > 0 |
//!      +------------------------------------------------------+
//!                 last listener, no pullers
//! ```
//!
//! The resource starts on leaving `Inactive` and stops on entering it, so it
//! is started and stopped exactly once per demand transition.

use std::rc::Weak;

use smallvec::SmallVec;

use super::{Behavior, BehaviorNode};
use crate::graph::EvalState;
use crate::reactive::{Observer, ReactiveKind, Stream, SubscriberId};

/// One edge from a derived node to something it depends on.
pub(crate) trait Link {
    fn kind(&self) -> ReactiveKind;

    /// Register the dependent and report the dependency's state.
    fn attach(&self) -> EvalState;

    fn detach(&self);

    fn state(&self) -> EvalState;

    fn change_pullers(&self, _delta: isize) {}
}

pub(crate) struct BehaviorLink<P> {
    parent: Behavior<P>,
    child: Weak<dyn Observer<P>>,
    child_id: SubscriberId,
}

impl<P: Clone + 'static> BehaviorLink<P> {
    pub(crate) fn new(parent: Behavior<P>, child: Weak<dyn Observer<P>>, child_id: SubscriberId) -> Self {
        Self {
            parent,
            child,
            child_id,
        }
    }
}

impl<P: Clone + 'static> Link for BehaviorLink<P> {
    fn kind(&self) -> ReactiveKind {
        ReactiveKind::Behavior
    }

    fn attach(&self) -> EvalState {
        match self.child.upgrade() {
            Some(child) => self.parent.add_listener(self.child_id, &child),
            None => self.parent.state(),
        }
    }

    fn detach(&self) {
        self.parent.remove_listener(self.child_id);
    }

    fn state(&self) -> EvalState {
        self.parent.state()
    }

    fn change_pullers(&self, delta: isize) {
        self.parent.change_pullers(delta);
    }
}

pub(crate) struct StreamLink<P> {
    stream: Stream<P>,
    child: Weak<dyn Observer<P>>,
    child_id: SubscriberId,
}

impl<P: Clone + 'static> StreamLink<P> {
    pub(crate) fn new(stream: Stream<P>, child: Weak<dyn Observer<P>>, child_id: SubscriberId) -> Self {
        Self {
            stream,
            child,
            child_id,
        }
    }
}

impl<P: Clone + 'static> Link for StreamLink<P> {
    fn kind(&self) -> ReactiveKind {
        ReactiveKind::Stream
    }

    fn attach(&self) -> EvalState {
        if let Some(child) = self.child.upgrade() {
            self.stream.add_listener(self.child_id, &child);
        }
        EvalState::Push
    }

    fn detach(&self) {
        self.stream.remove_listener(self.child_id);
    }

    // Occurrences are always pushed.
    fn state(&self) -> EvalState {
        EvalState::Push
    }
}

/// The ordered dependencies of a derived node.
pub(crate) struct Dependencies {
    links: SmallVec<[Box<dyn Link>; 2]>,
}

impl Dependencies {
    pub(crate) fn new(links: SmallVec<[Box<dyn Link>; 2]>) -> Self {
        assert!(!links.is_empty(), "a derived behavior needs at least one dependency");
        Self { links }
    }

    pub(crate) fn one(link: impl Link + 'static) -> Self {
        let mut links: SmallVec<[Box<dyn Link>; 2]> = SmallVec::new();
        links.push(Box::new(link));
        Self::new(links)
    }

    pub(crate) fn two(first: impl Link + 'static, second: impl Link + 'static) -> Self {
        let mut links: SmallVec<[Box<dyn Link>; 2]> = SmallVec::new();
        links.push(Box::new(first));
        links.push(Box::new(second));
        Self::new(links)
    }

    /// Attach to every dependency, front to back.
    pub(crate) fn attach_all(&self) -> EvalState {
        let mut combined = EvalState::Push;
        for link in &self.links {
            let state = link.attach();
            if state != EvalState::Push {
                combined = state;
            }
        }
        combined
    }

    /// Detach from every dependency, in attachment order.
    pub(crate) fn detach_all(&self) {
        for link in &self.links {
            link.detach();
        }
    }

    pub(crate) fn combined_state(&self) -> EvalState {
        self.links.iter().fold(EvalState::Push, |combined, link| match link.state() {
            EvalState::Push => combined,
            state => state,
        })
    }

    pub(crate) fn change_pullers(&self, delta: isize) {
        for link in self.links.iter().filter(|link| link.kind() == ReactiveKind::Behavior) {
            link.change_pullers(delta);
        }
    }
}

/// Erase a node's weak self-reference to the observer type a link needs.
pub(crate) fn weak_observer<P, N>(me: &Weak<N>) -> Weak<dyn Observer<P>>
where
    N: Observer<P> + 'static,
{
    me.clone()
}

pub(crate) mod stateless {
    use super::*;

    pub(crate) fn activate<A, N>(node: &N, deps: &Dependencies)
    where
        A: Clone + 'static,
        N: BehaviorNode<A> + ?Sized,
    {
        let state = deps.attach_all();
        enter(node, state);
    }

    pub(crate) fn deactivate<A, N>(node: &N, deps: &Dependencies)
    where
        A: Clone + 'static,
        N: BehaviorNode<A> + ?Sized,
    {
        deps.detach_all();
        node.core().set_state(EvalState::Inactive);
    }

    pub(crate) fn change_pullers<A, N>(node: &N, deps: &Dependencies, delta: isize)
    where
        N: BehaviorNode<A> + ?Sized,
    {
        node.core().adjust_pullers(delta);
        deps.change_pullers(delta);
    }

    /// Re-derive the state after a dependency announced a change, and pass
    /// the new state on.
    pub(crate) fn refresh<A, N>(node: &N, deps: &Dependencies)
    where
        A: Clone + 'static,
        N: BehaviorNode<A> + ?Sized,
    {
        let core = node.core();
        if core.listener_count() == 0 {
            return;
        }
        let state = deps.combined_state();
        if state == core.state() {
            return;
        }
        enter(node, state);
        core.forward_state(state);
    }

    fn enter<A, N>(node: &N, state: EvalState)
    where
        A: Clone + 'static,
        N: BehaviorNode<A> + ?Sized,
    {
        let core = node.core();
        if state != EvalState::Push {
            core.set_state(state);
            return;
        }
        match node.pull() {
            Ok(value) => core.adopt(EvalState::Push, value),
            Err(err) => {
                tracing::error!(node = core.id().raw(), kind = core.kind(), %err, "cannot seed cache, staying in pull mode");
                core.set_state(EvalState::Pull);
            }
        }
    }
}

pub(crate) mod stateful {
    use super::*;

    pub(crate) fn activate<A, N>(node: &N)
    where
        N: BehaviorNode<A> + ?Sized,
    {
        tracing::trace!(node = node.core().id().raw(), "stateful node is always active");
    }

    pub(crate) fn deactivate<A, N>(node: &N)
    where
        N: BehaviorNode<A> + ?Sized,
    {
        tracing::trace!(node = node.core().id().raw(), "stateful node stays active");
    }
}

/// The resource a producer node owns.
pub(crate) trait Producer<A> {
    fn start(&self);
    fn stop(&self);

    /// The latest value produced.
    fn current(&self) -> A;
}

pub(crate) mod producer {
    use super::*;

    pub(crate) fn activate<A, N>(node: &N)
    where
        A: Clone + 'static,
        N: BehaviorNode<A> + Producer<A> + ?Sized,
    {
        let core = node.core();
        if core.state() == EvalState::Inactive {
            tracing::debug!(node = core.id().raw(), kind = core.kind(), "starting producer");
            node.start();
        }
        core.adopt(EvalState::Push, node.current());
    }

    pub(crate) fn deactivate<A, N>(node: &N)
    where
        A: Clone + 'static,
        N: BehaviorNode<A> + Producer<A> + ?Sized,
    {
        let core = node.core();
        if core.pullers() > 0 {
            core.set_state(EvalState::Pull);
            return;
        }
        core.set_state(EvalState::Inactive);
        tracing::debug!(node = core.id().raw(), kind = core.kind(), "stopping producer");
        node.stop();
    }

    pub(crate) fn change_pullers<A, N>(node: &N, delta: isize)
    where
        A: Clone + 'static,
        N: BehaviorNode<A> + Producer<A> + ?Sized,
    {
        let core = node.core();
        let (previous, current) = core.adjust_pullers(delta);
        if previous == 0 && current > 0 && core.state() == EvalState::Inactive {
            core.set_state(EvalState::Pull);
            tracing::debug!(node = core.id().raw(), kind = core.kind(), "starting producer for pullers");
            node.start();
        } else if previous > 0 && current == 0 && core.state() == EvalState::Pull {
            core.set_state(EvalState::Inactive);
            tracing::debug!(node = core.id().raw(), kind = core.kind(), "stopping producer, no pullers left");
            node.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use crate::behavior::{constant, from_function, sink_behavior};
    use crate::reactive::CallbackObserver;

    fn probe<P: Clone + 'static>() -> (SubscriberId, Rc<dyn Observer<P>>) {
        let observer = CallbackObserver::new(|_: P| {});
        (observer.id(), Rc::new(observer))
    }

    #[test]
    fn combined_state_takes_the_last_non_push_state() {
        let (id, observer) = probe::<i32>();
        let deps = Dependencies::two(
            BehaviorLink::new(from_function(|| 1), Rc::downgrade(&observer), id),
            BehaviorLink::new(constant(2), Rc::downgrade(&observer), id),
        );
        assert_eq!(deps.attach_all(), EvalState::OnlyPull);
        assert_eq!(deps.combined_state(), EvalState::OnlyPull);
        deps.detach_all();
    }

    #[test]
    fn pullers_skip_stream_dependencies() {
        let (id, observer) = probe::<i32>();
        let sink = sink_behavior(0);
        let deps = Dependencies::two(
            StreamLink::new(Stream::new(), Rc::downgrade(&observer), id),
            BehaviorLink::new(sink.behavior(), Rc::downgrade(&observer), id),
        );

        deps.change_pullers(1);
        assert_eq!(sink.puller_count(), 1);
        deps.change_pullers(-1);
        assert_eq!(sink.puller_count(), 0);
    }

    #[test]
    #[should_panic(expected = "at least one dependency")]
    fn dependencies_cannot_be_empty() {
        Dependencies::new(SmallVec::new());
    }
}
