//! Rill Core
//!
//! This crate provides the runtime for Rill, a library of composable
//! *behaviors*: values that change over time, evaluated by a hybrid
//! push/pull engine. It implements:
//!
//! - The behavior evaluation protocol (push, pull, activation)
//! - Listener and puller counting that starts and stops producers exactly
//!   once per change in demand
//! - Glitch-free propagation ordered by rank
//! - Combinators: map, apply, chain, switching, stepping, scanning,
//!   snapshots and integration
//!
//! Everything is single-threaded. Behaviors are `!Send` and each thread runs
//! its own independent graph.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: evaluation state, per-node bookkeeping and the propagation
//!   scheduler
//! - `reactive`: observer contracts, listener registries, streams and futures
//! - `behavior`: the [`Behavior`] handle and every combinator
//! - `timer`: tokio-driven producers
//! - `config`, `clock`, `error`: runtime settings, time source, error type
//!
//! # Example
//!
//! ```rust
//! use std::{cell::RefCell, rc::Rc};
//! use rill_core::{lift2, sink_behavior, EvalState};
//!
//! let price = sink_behavior(10);
//! let quantity = sink_behavior(3);
//! let total = lift2(|p: i32, q: i32| p * q, &price, &quantity);
//!
//! // Unobserved behaviors are recomputed on demand.
//! assert_eq!(total.at(), 30);
//! assert_eq!(total.state(), EvalState::Inactive);
//!
//! // Observed behaviors push their changes.
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let seen_clone = seen.clone();
//! let handle = total.subscribe(move |v| seen_clone.borrow_mut().push(v));
//! quantity.push(4);
//! assert_eq!(*seen.borrow(), vec![40]);
//!
//! // Dropping the handle detaches the whole chain again.
//! drop(handle);
//! assert_eq!(price.listener_count(), 0);
//! ```

pub mod behavior;
pub mod clock;
pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod timer;

/// A point in time, in milliseconds.
pub type Time = f64;

pub use behavior::{
    ap, at, constant, from_function, integrate, lift2, lift3, producer_behavior, scan,
    sink_behavior, snapshot_at, stepper, switch_to, switcher, test_behavior, time, time_from,
    toggle, when, Behavior, Func, Pusher, SemanticFn, SinkBehavior,
};
pub use config::{ClockSource, RuntimeConfig};
pub use error::{BehaviorError, Result};
pub use graph::{batch, is_propagating, EvalState, NodeStats};
pub use reactive::{is_behavior, Future, Reactive, ReactiveHandle, Stream, SubscriberId};
pub use timer::interval;
