//! Propagation Scheduler
//!
//! The scheduler decides the order in which pushed values reach their
//! observers. It guarantees that a node only runs after every node it
//! depends on has been updated, so no observer ever reads a half-updated
//! graph.
//!
//! # Algorithm
//!
//! Every observer carries a *rank* strictly greater than the rank of
//! everything it listens to (see [`crate::reactive::Ranked`]). Propagation
//! happens in *passes*:
//!
//! 1. An external event (a sink push, a stream occurrence, a producer tick)
//!    opens a pass.
//! 2. Whenever a node publishes a value, one delivery per listener is queued,
//!    keyed by the listener's rank.
//! 3. A listener that already has a delivery queued in this pass keeps one
//!    entry; the newer value replaces the older one.
//! 4. When the outermost event handler returns, deliveries are processed in
//!    ascending rank order. Deliveries made while processing join the same
//!    pass.
//!
//! For a diamond (two maps of one source recombined with `ap`) both maps run
//! before the combination, which therefore runs once and sees one
//! consistent snapshot.
//!
//! Ranks can grow while a pass is running (a chain switching to a deeper
//! inner behavior). A delivery whose target outranks its queue position is
//! re-queued instead of run early.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;

use crate::config::RuntimeConfig;
use crate::reactive::{Observer, SubscriberId};

/// A queued value for one observer, with its type erased.
trait PendingDelivery {
    fn rank(&self) -> u32;
    fn deliver(self: Box<Self>);
}

struct Delivery<A> {
    observer: Rc<dyn Observer<A>>,
    value: A,
}

impl<A: 'static> PendingDelivery for Delivery<A> {
    fn rank(&self) -> u32 {
        self.observer.rank()
    }

    fn deliver(self: Box<Self>) {
        let Delivery { observer, value } = *self;
        observer.push(value);
    }
}

struct Pending {
    rank: u32,
    seq: u64,
    /// The node that produced the value, used to cancel deliveries on an
    /// edge that was just removed.
    source: SubscriberId,
    delivery: Box<dyn PendingDelivery>,
}

#[derive(Default)]
struct Pass {
    open: bool,
    seq: u64,
    queue: BinaryHeap<Reverse<(u32, u64, SubscriberId)>>,
    pending: HashMap<SubscriberId, Pending>,
}

impl Pass {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Queue a delivery. Returns a superseded delivery, which the caller
    /// must drop outside the borrow since dropping it may re-enter the pass.
    fn enqueue(
        &mut self,
        source: SubscriberId,
        target: SubscriberId,
        delivery: Box<dyn PendingDelivery>,
    ) -> Option<Box<dyn PendingDelivery>> {
        if let Some(pending) = self.pending.get_mut(&target) {
            pending.source = source;
            return Some(std::mem::replace(&mut pending.delivery, delivery));
        }
        let rank = delivery.rank();
        let seq = self.next_seq();
        self.queue.push(Reverse((rank, seq, target)));
        self.pending.insert(
            target,
            Pending {
                rank,
                seq,
                source,
                delivery,
            },
        );
        None
    }

    /// Take the lowest-ranked delivery that is ready to run.
    fn pop(&mut self) -> Option<(SubscriberId, Pending)> {
        while let Some(Reverse((rank, seq, target))) = self.queue.pop() {
            let current = match self.pending.get(&target) {
                Some(pending) if pending.seq == seq => pending.delivery.rank(),
                // Cancelled or re-queued under a newer sequence number.
                _ => continue,
            };
            if current > rank {
                let seq = self.next_seq();
                if let Some(pending) = self.pending.get_mut(&target) {
                    pending.rank = current;
                    pending.seq = seq;
                }
                self.queue.push(Reverse((current, seq, target)));
                continue;
            }
            return self.pending.remove(&target).map(|pending| (target, pending));
        }
        None
    }

    fn cancel(&mut self, source: SubscriberId, target: SubscriberId) -> Option<Pending> {
        match self.pending.get(&target) {
            Some(pending) if pending.source == source => self.pending.remove(&target),
            _ => None,
        }
    }
}

thread_local! {
    static PASS: RefCell<Pass> = RefCell::new(Pass::default());
}

/// Closes the pass when the outermost batch ends, even on unwind.
struct PassGuard {
    outermost: bool,
}

impl PassGuard {
    fn open() -> Self {
        let outermost = PASS.with(|pass| !std::mem::replace(&mut pass.borrow_mut().open, true));
        Self { outermost }
    }

    fn finish(self) {
        if self.outermost {
            drain();
        }
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        if !self.outermost {
            return;
        }
        let leftovers = PASS.with(|pass| {
            let mut pass = pass.borrow_mut();
            pass.open = false;
            (
                std::mem::take(&mut pass.queue),
                std::mem::take(&mut pass.pending),
            )
        });
        drop(leftovers);
    }
}

fn drain() {
    let limit = RuntimeConfig::current().max_pass_deliveries;
    let mut delivered = 0usize;
    loop {
        let next = PASS.with(|pass| pass.borrow_mut().pop());
        let Some((target, pending)) = next else {
            break;
        };
        delivered += 1;
        if delivered > limit {
            panic!(
                "propagation pass exceeded {limit} deliveries; sinks are probably feeding each other"
            );
        }
        tracing::trace!(target = target.raw(), rank = pending.rank, "delivering");
        pending.delivery.deliver();
    }
}

/// Run `f` inside a single propagation pass.
///
/// Every push made by `f` (sink pushes, stream occurrences) is propagated
/// together once `f` returns, so observers see the combined effect exactly
/// once. Nested calls join the enclosing pass.
///
/// ```rust
/// use std::{cell::RefCell, rc::Rc};
/// use rill_core::{batch, lift2, sink_behavior};
///
/// let a = sink_behavior(1);
/// let b = sink_behavior(2);
/// let sum = lift2(|a: i32, b: i32| a + b, &a, &b);
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let seen_clone = seen.clone();
/// let _handle = sum.subscribe(move |v| seen_clone.borrow_mut().push(v));
///
/// batch(|| {
///     a.push(10);
///     b.push(20);
/// });
/// assert_eq!(*seen.borrow(), vec![30]);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let guard = PassGuard::open();
    let result = f();
    guard.finish();
    result
}

/// Whether a propagation pass is open on this thread.
pub fn is_propagating() -> bool {
    PASS.with(|pass| pass.borrow().open)
}

/// Queue `value` for `observer`. Must be called inside [`batch`].
pub(crate) fn schedule<A: 'static>(
    source: SubscriberId,
    target: SubscriberId,
    observer: Rc<dyn Observer<A>>,
    value: A,
) {
    debug_assert!(is_propagating(), "deliveries must be scheduled inside a pass");
    let delivery: Box<dyn PendingDelivery> = Box::new(Delivery { observer, value });
    let superseded = PASS.with(|pass| pass.borrow_mut().enqueue(source, target, delivery));
    drop(superseded);
}

/// Drop any delivery from `source` still queued for `target`.
pub(crate) fn cancel(source: SubscriberId, target: SubscriberId) {
    let cancelled = PASS.with(|pass| pass.borrow_mut().cancel(source, target));
    if cancelled.is_some() {
        tracing::trace!(source = source.raw(), target = target.raw(), "cancelled pending delivery");
    }
}
