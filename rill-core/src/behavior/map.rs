//! Map and apply.
//!
//! Both are stateless. `apply` registers with its function behavior before
//! its value behavior; n-ary lifting is map followed by repeated apply.

use std::rc::Rc;

use super::activation::{stateless, weak_observer, BehaviorLink, Dependencies};
use super::{Behavior, BehaviorNode, Func, SemanticFn};
use crate::error::Result;
use crate::graph::{EvalState, NodeCore};
use crate::reactive::{Observer, Ranked, SubscriberId};

pub(crate) struct MapNode<A, B> {
    core: NodeCore<B>,
    parent: Behavior<A>,
    f: Func<A, B>,
    deps: Dependencies,
}

impl<A: Clone + 'static, B: Clone + 'static> MapNode<A, B> {
    fn new(parent: &Behavior<A>, f: Func<A, B>) -> Rc<Self> {
        let id = SubscriberId::new();
        Rc::new_cyclic(|me| Self {
            core: NodeCore::with_id(id, "map"),
            parent: parent.clone(),
            f,
            deps: Dependencies::one(BehaviorLink::new(parent.clone(), weak_observer(me), id)),
        })
    }
}

impl<A: Clone + 'static, B: Clone + 'static> Ranked for MapNode<A, B> {
    fn rank(&self) -> u32 {
        self.core.rank()
    }

    fn raise_rank(&self, above: u32) {
        self.core.raise_rank(above);
    }
}

impl<A: Clone + 'static, B: Clone + 'static> Observer<A> for MapNode<A, B> {
    fn push(&self, value: A) {
        if self.core.state() == EvalState::Push {
            self.core.publish((self.f)(value));
        }
    }

    fn change_state_down(&self, _state: EvalState) {
        stateless::refresh(self, &self.deps);
    }
}

impl<A: Clone + 'static, B: Clone + 'static> BehaviorNode<B> for MapNode<A, B> {
    fn core(&self) -> &NodeCore<B> {
        &self.core
    }

    fn pull(&self) -> Result<B> {
        Ok((self.f)(self.parent.try_at()?))
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

    fn semantic(&self) -> Result<SemanticFn<B>> {
        let inner = self.parent.semantic()?;
        let f = Rc::clone(&self.f);
        Ok(Rc::new(move |t| f(inner(t))))
    }
}

pub(crate) struct ApNode<A, B> {
    core: NodeCore<B>,
    fn_b: Behavior<Func<A, B>>,
    val_b: Behavior<A>,
    deps: Dependencies,
}

impl<A: Clone + 'static, B: Clone + 'static> ApNode<A, B> {
    fn new(fn_b: &Behavior<Func<A, B>>, val_b: &Behavior<A>) -> Rc<Self> {
        let id = SubscriberId::new();
        Rc::new_cyclic(|me| Self {
            core: NodeCore::with_id(id, "ap"),
            fn_b: fn_b.clone(),
            val_b: val_b.clone(),
            deps: Dependencies::two(
                BehaviorLink::new(fn_b.clone(), weak_observer(me), id),
                BehaviorLink::new(val_b.clone(), weak_observer(me), id),
            ),
        })
    }
}

impl<A: Clone + 'static, B: Clone + 'static> Ranked for ApNode<A, B> {
    fn rank(&self) -> u32 {
        self.core.rank()
    }

    fn raise_rank(&self, above: u32) {
        self.core.raise_rank(above);
    }
}

// Either input changing means "sample both and recompute".
impl<X, A: Clone + 'static, B: Clone + 'static> Observer<X> for ApNode<A, B> {
    fn push(&self, _value: X) {
        if self.core.state() != EvalState::Push {
            return;
        }
        match self.pull() {
            Ok(value) => {
                self.core.publish(value);
            }
            Err(err) => {
                tracing::error!(node = self.core.id().raw(), %err, "dropping push");
            }
        }
    }

    fn change_state_down(&self, _state: EvalState) {
        stateless::refresh(self, &self.deps);
    }
}

impl<A: Clone + 'static, B: Clone + 'static> BehaviorNode<B> for ApNode<A, B> {
    fn core(&self) -> &NodeCore<B> {
        &self.core
    }

    fn pull(&self) -> Result<B> {
        let f = self.fn_b.try_at()?;
        Ok(f(self.val_b.try_at()?))
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

    fn semantic(&self) -> Result<SemanticFn<B>> {
        let fs = self.fn_b.semantic()?;
        let vs = self.val_b.semantic()?;
        Ok(Rc::new(move |t| fs(t)(vs(t))))
    }
}

impl<A: Clone + 'static> Behavior<A> {
    /// A behavior whose value is `f` applied to this one's.
    pub fn map<B, F>(&self, f: F) -> Behavior<B>
    where
        B: Clone + 'static,
        F: Fn(A) -> B + 'static,
    {
        Behavior::from_node(MapNode::new(self, Rc::new(f)))
    }

    /// Apply the function held by `fn_b` to this behavior's value.
    pub fn ap<B: Clone + 'static>(&self, fn_b: &Behavior<Func<A, B>>) -> Behavior<B> {
        ap(fn_b, self)
    }
}

/// Apply a function-valued behavior to a value behavior.
pub fn ap<A, B>(fn_b: &Behavior<Func<A, B>>, val_b: &Behavior<A>) -> Behavior<B>
where
    A: Clone + 'static,
    B: Clone + 'static,
{
    Behavior::from_node(ApNode::new(fn_b, val_b))
}

/// Combine two behaviors with `f`.
pub fn lift2<A, B, R, F>(f: F, a: &Behavior<A>, b: &Behavior<B>) -> Behavior<R>
where
    A: Clone + 'static,
    B: Clone + 'static,
    R: Clone + 'static,
    F: Fn(A, B) -> R + 'static,
{
    let f = Rc::new(f);
    let curried = a.map(move |a: A| -> Func<B, R> {
        let f = Rc::clone(&f);
        Rc::new(move |b| f(a.clone(), b))
    });
    ap(&curried, b)
}

/// Combine three behaviors with `f`.
pub fn lift3<A, B, C, R, F>(f: F, a: &Behavior<A>, b: &Behavior<B>, c: &Behavior<C>) -> Behavior<R>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
    R: Clone + 'static,
    F: Fn(A, B, C) -> R + 'static,
{
    let f = Rc::new(f);
    let curried = a.map(move |a: A| -> Func<B, Func<C, R>> {
        let f = Rc::clone(&f);
        Rc::new(move |b: B| -> Func<C, R> {
            let f = Rc::clone(&f);
            let a = a.clone();
            Rc::new(move |c| f(a.clone(), b.clone(), c))
        })
    });
    ap(&ap(&curried, b), c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{constant, sink_behavior, test_behavior};
    use std::cell::RefCell;

    #[test]
    fn map_pulls_while_unobserved() {
        let source = sink_behavior(2);
        let doubled = source.map(|n: i32| n * 2);
        assert_eq!(doubled.state(), EvalState::Inactive);
        assert_eq!(doubled.at(), 4);

        source.push(5);
        assert_eq!(doubled.at(), 10);
    }

    #[test]
    fn map_pushes_while_observed() {
        let source = sink_behavior(1);
        let doubled = source.map(|n: i32| n * 2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let handle = doubled.subscribe(move |v| seen_clone.borrow_mut().push(v));

        assert_eq!(doubled.state(), EvalState::Push);
        source.push(3);
        source.push(4);
        assert_eq!(*seen.borrow(), vec![6, 8]);
        assert_eq!(doubled.at(), 8);

        drop(handle);
        assert_eq!(doubled.state(), EvalState::Inactive);
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn map_semantic_composes() {
        let b = test_behavior(|t| t * 2.0).map(|x| x + 1.0);
        let semantic = b.semantic().unwrap();
        assert_eq!(semantic(3.0), 7.0);
    }

    #[test]
    fn ap_registers_function_before_value() {
        let f = sink_behavior::<u8>(0).map(|_| -> Func<i32, i32> { Rc::new(|x: i32| x + 1) });
        let v = sink_behavior(1);
        let applied = ap(&f, &v);
        let _handle = applied.subscribe(|_| {});

        assert_eq!(applied.at(), 2);
        assert!(f.rank() < applied.rank());
        assert!(v.rank() < applied.rank());
        v.push(10);
        assert_eq!(applied.at(), 11);
    }

    #[test]
    fn lifted_functions_see_current_values() {
        let a = sink_behavior(1);
        let b = sink_behavior(10);
        let c = constant(100);
        let total = lift3(|a: i32, b: i32, c: i32| a + b + c, &a, &b, &c);
        assert_eq!(total.at(), 111);

        let _handle = total.subscribe(|_| {});
        a.push(2);
        assert_eq!(total.at(), 112);
        assert_eq!(lift2(|a: i32, b: i32| a * b, &a, &b).at(), 20);
    }

    #[test]
    fn ap_semantic_needs_both_sides() {
        let f = constant::<Func<f64, f64>>(Rc::new(|x: f64| x * 10.0));
        let applied = ap(&f, &test_behavior(|t| t));
        assert_eq!(applied.semantic().unwrap()(2.0), 20.0);

        let opaque = ap(&f, &sink_behavior(1.0).behavior());
        assert!(opaque.semantic().is_err());
    }
}
