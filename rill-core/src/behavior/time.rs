//! Continuous behaviors: functions of the clock, and integration.
//!
//! These can only be sampled. Their state is `OnlyPull` for their whole
//! life, so listeners fall back to pulling.

use std::cell::Cell;
use std::rc::Rc;

use super::activation::stateful;
use super::{Behavior, BehaviorNode, SemanticFn};
use crate::clock;
use crate::config::RuntimeConfig;
use crate::error::{BehaviorError, Result};
use crate::graph::{EvalState, NodeCore};
use crate::Time;

fn only_pull<A: Clone + 'static>(kind: &'static str) -> NodeCore<A> {
    let core = NodeCore::new(kind);
    core.set_state(EvalState::OnlyPull);
    core
}

pub(crate) struct FunctionNode<A> {
    core: NodeCore<A>,
    f: Box<dyn Fn() -> A>,
    semantic: Option<SemanticFn<A>>,
}

impl<A: Clone + 'static> BehaviorNode<A> for FunctionNode<A> {
    fn core(&self) -> &NodeCore<A> {
        &self.core
    }

    fn pull(&self) -> Result<A> {
        Ok((self.f)())
    }

    fn activate(&self) {
        stateful::activate(self);
    }

    fn deactivate(&self) {
        stateful::deactivate(self);
    }

    fn semantic(&self) -> Result<SemanticFn<A>> {
        self.semantic
            .clone()
            .ok_or(BehaviorError::NoSemantic(self.core.kind()))
    }
}

/// A behavior whose value is `f()` at every sample.
pub fn from_function<A, F>(f: F) -> Behavior<A>
where
    A: Clone + 'static,
    F: Fn() -> A + 'static,
{
    Behavior::from_node(Rc::new(FunctionNode {
        core: only_pull("function"),
        f: Box::new(f),
        semantic: None,
    }))
}

/// The current time in milliseconds, as read from [`crate::clock`].
pub fn time() -> Behavior<Time> {
    let semantic: SemanticFn<Time> = Rc::new(|t: Time| t);
    Behavior::from_node(Rc::new(FunctionNode {
        core: only_pull("time"),
        f: Box::new(clock::now),
        semantic: Some(semantic),
    }))
}

pub(crate) struct TimeFromNode {
    core: NodeCore<Time>,
    start: Time,
}

impl BehaviorNode<Time> for TimeFromNode {
    fn core(&self) -> &NodeCore<Time> {
        &self.core
    }

    fn pull(&self) -> Result<Time> {
        Ok(clock::now() - self.start)
    }

    fn activate(&self) {
        stateful::activate(self);
    }

    fn deactivate(&self) {
        stateful::deactivate(self);
    }
}

/// Time elapsed since the moment the outer behavior was sampled.
pub fn time_from() -> Behavior<Behavior<Time>> {
    from_function(|| {
        Behavior::from_node(Rc::new(TimeFromNode {
            core: only_pull("time_from"),
            start: clock::now(),
        }))
    })
}

pub(crate) struct IntegrateNode {
    core: NodeCore<f64>,
    rate: Behavior<f64>,
    last_pull: Cell<Time>,
    value: Cell<f64>,
}

impl BehaviorNode<f64> for IntegrateNode {
    fn core(&self) -> &NodeCore<f64> {
        &self.core
    }

    /// Adds `elapsed * rate` since the previous pull. The result depends on
    /// how often the integral is sampled.
    fn pull(&self) -> Result<f64> {
        let rate = self.rate.try_at()?;
        let now = clock::now();
        let elapsed = (now - self.last_pull.replace(now)) / RuntimeConfig::current().integration_unit_ms;
        let value = self.value.get() + elapsed * rate;
        self.value.set(value);
        Ok(value)
    }

    fn activate(&self) {
        stateful::activate(self);
    }

    fn deactivate(&self) {
        stateful::deactivate(self);
    }

    fn change_pullers(&self, delta: isize) {
        self.core.adjust_pullers(delta);
        self.rate.change_pullers(delta);
    }
}

/// Integrate `rate` over time, in units per `integration_unit_ms`
/// (one second by default).
///
/// Sampling the outer behavior starts a fresh integral at zero.
pub fn integrate(rate: &Behavior<f64>) -> Behavior<Behavior<f64>> {
    let rate = rate.clone();
    from_function(move || {
        Behavior::from_node(Rc::new(IntegrateNode {
            core: only_pull("integrate"),
            rate: rate.clone(),
            last_pull: Cell::new(clock::now()),
            value: Cell::new(0.0),
        }))
    })
}

pub(crate) struct TestNode<A> {
    core: NodeCore<A>,
    semantic: SemanticFn<A>,
}

impl<A: Clone + 'static> BehaviorNode<A> for TestNode<A> {
    fn core(&self) -> &NodeCore<A> {
        &self.core
    }

    fn pull(&self) -> Result<A> {
        Err(BehaviorError::NotSampleable(self.core.kind()))
    }

    fn semantic(&self) -> Result<SemanticFn<A>> {
        Ok(Rc::clone(&self.semantic))
    }
}

/// A behavior that exists only as its meaning, for checking laws against
/// semantic functions. It cannot be sampled or observed.
pub fn test_behavior<A, F>(semantic: F) -> Behavior<A>
where
    A: Clone + 'static,
    F: Fn(Time) -> A + 'static,
{
    Behavior::from_node(Rc::new(TestNode {
        core: NodeCore::new("test"),
        semantic: Rc::new(semantic),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::sink_behavior;
    use crate::config::ClockSource;

    fn manual_clock(start: Time) {
        RuntimeConfig {
            clock: ClockSource::Manual,
            ..RuntimeConfig::default()
        }
        .install();
        clock::set(start);
    }

    #[test]
    fn function_behaviors_are_pull_only() {
        let counter = Rc::new(Cell::new(0));
        let c = counter.clone();
        let b = from_function(move || {
            c.set(c.get() + 1);
            c.get()
        });
        assert_eq!(b.state(), EvalState::OnlyPull);
        assert_eq!(b.at(), 1);
        assert_eq!(b.at(), 2);
    }

    #[test]
    fn time_reads_the_clock() {
        manual_clock(1_000.0);
        let t = time();
        assert_eq!(t.at(), 1_000.0);
        clock::advance(250.0);
        assert_eq!(t.at(), 1_250.0);
        assert_eq!(t.semantic().unwrap()(42.0), 42.0);
    }

    #[test]
    fn time_from_counts_from_the_sample() {
        manual_clock(500.0);
        let outer = time_from();
        clock::advance(100.0);
        let elapsed = outer.at();
        assert_eq!(elapsed.at(), 0.0);
        clock::advance(40.0);
        assert_eq!(elapsed.at(), 40.0);
    }

    #[test]
    fn integrate_accumulates_between_pulls() {
        manual_clock(0.0);
        let rate = sink_behavior(2.0);
        let distance = integrate(&rate).at();

        clock::advance(1_000.0);
        assert_eq!(distance.at(), 2.0);
        rate.push(4.0);
        clock::advance(500.0);
        assert_eq!(distance.at(), 4.0);
    }

    #[test]
    fn observing_an_integral_pulls_its_rate() {
        manual_clock(0.0);
        let rate = sink_behavior(1.0);
        let distance = integrate(&rate).at();
        let handle = distance.subscribe(|_| {});
        assert_eq!(rate.puller_count(), 1);
        drop(handle);
        assert_eq!(rate.puller_count(), 0);
    }

    #[test]
    fn test_behaviors_cannot_be_sampled() {
        let b = test_behavior(|t| t + 1.0);
        assert_eq!(b.try_at(), Err(BehaviorError::NotSampleable("test")));
        assert_eq!(b.semantic().unwrap()(1.0), 2.0);
    }
}
