//! Reactive Contracts
//!
//! This module defines the narrow contracts that connect behaviors to the
//! rest of the world, together with minimal implementations of the
//! collaborators behaviors consume.
//!
//! # Concepts
//!
//! ## Observers
//!
//! An [`Observer`] receives values pushed by something upstream. Every
//! derived behavior is an observer of its dependencies, and so is every
//! callback registered with `subscribe`. Observers also carry a *rank*
//! (see [`Ranked`]) which the propagation pass uses to order deliveries so
//! that an observer always runs after everything it depends on.
//!
//! ## Listener registries
//!
//! Every reactive value keeps its observers in a [`ListenerRegistry`].
//! Registries hold observers weakly: whoever wants an observer to stay
//! registered owns it, usually through a [`ReactiveHandle`].
//!
//! ## Streams and futures
//!
//! [`Stream`] is a discrete source of occurrences and [`Future`] a one-shot
//! result. They drive steppers, scans, switchers and snapshots. Their
//! implementations here are intentionally simple.

mod future;
mod registry;
mod stream;
mod subscriber;

pub use future::Future;
pub use registry::ListenerRegistry;
pub use stream::Stream;
pub use subscriber::{CallbackObserver, ReactiveHandle, SubscriberId};

use crate::graph::EvalState;

/// Anything that takes part in rank ordering during propagation.
pub trait Ranked {
    /// The observer's current rank.
    fn rank(&self) -> u32;

    /// Ensure the rank is strictly greater than `above`.
    ///
    /// Implementations that have observers of their own must forward the
    /// raise so ranks stay strictly increasing downstream.
    fn raise_rank(&self, above: u32);
}

/// A receiver of pushed values.
pub trait Observer<A>: Ranked {
    /// Receive a new value from upstream.
    fn push(&self, value: A);

    /// Upstream changed its evaluation state.
    fn change_state_down(&self, _state: EvalState) {}
}

/// The kinds of reactive values this crate knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactiveKind {
    /// A continuous, sampleable value.
    Behavior,
    /// A discrete sequence of occurrences.
    Stream,
    /// A single occurrence.
    Future,
}

/// Runtime capability check over reactive values.
pub trait Reactive {
    /// What kind of reactive value this is.
    fn kind(&self) -> ReactiveKind;
}

/// Whether `value` is a behavior, i.e. has a current value that can be
/// sampled.
pub fn is_behavior(value: &dyn Reactive) -> bool {
    value.kind() == ReactiveKind::Behavior
}
