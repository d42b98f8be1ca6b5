//! Constant behaviors.

use std::rc::Rc;

use super::activation::stateful;
use super::{Behavior, BehaviorNode, SemanticFn};
use crate::error::Result;
use crate::graph::{EvalState, NodeCore};
use crate::Time;

pub(crate) struct ConstantNode<A> {
    core: NodeCore<A>,
    value: A,
}

impl<A: Clone + 'static> BehaviorNode<A> for ConstantNode<A> {
    fn core(&self) -> &NodeCore<A> {
        &self.core
    }

    fn pull(&self) -> Result<A> {
        Ok(self.value.clone())
    }

    fn activate(&self) {
        stateful::activate(self);
    }

    fn deactivate(&self) {
        stateful::deactivate(self);
    }

    fn semantic(&self) -> Result<SemanticFn<A>> {
        let value = self.value.clone();
        Ok(Rc::new(move |_: Time| value.clone()))
    }
}

/// A behavior that always has `value`. It is permanently in push mode and
/// never pushes.
pub fn constant<A: Clone + 'static>(value: A) -> Behavior<A> {
    let core = NodeCore::new("constant");
    core.adopt(EvalState::Push, value.clone());
    Behavior::from_node(Rc::new(ConstantNode { core, value }))
}

impl<A: Clone + 'static> Behavior<A> {
    /// A constant behavior, ignoring this one. Equivalent to `map(|_| value)`
    /// for a behavior that never changes.
    pub fn map_to<B: Clone + 'static>(&self, value: B) -> Behavior<B> {
        constant(value)
    }
}
