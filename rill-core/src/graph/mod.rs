//! Dependency Graph
//!
//! This module holds the per-node bookkeeping and the scheduler that moves
//! values through the graph of behaviors.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph where:
//!
//! - Nodes are behaviors, streams, futures and callbacks
//! - Edges are listener registrations: if A listens to B, B pushes to A
//!
//! Edges are not stored centrally. Each node owns the registry of its own
//! listeners, and derived nodes own the ordered list of what they depend
//! on. A node joins the live graph when somebody listens to it and leaves it
//! when the last listener goes away, taking its upstream subscriptions with
//! it.
//!
//! # Design Decisions
//!
//! 1. Registries hold listeners weakly and dependents hold their
//!    dependencies strongly, so the graph never forms reference cycles.
//!
//! 2. Ordering is by rank rather than by an explicit topological sort.
//!    Ranks are maintained incrementally as edges are added, which keeps
//!    dynamic rewiring (chain, switcher) cheap.
//!
//! 3. The cache is a tagged value that is only valid in push mode, so a
//!    stale value can never be read by accident.

mod node;
pub(crate) mod scheduler;

pub use node::{EvalState, NodeStats};
pub(crate) use node::NodeCore;
pub use scheduler::{batch, is_propagating};
