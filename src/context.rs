//! Evaluation context handed to computation bodies.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::declaration::{downcast_value, ErasedValue};
use crate::engine::EngineInner;
use crate::node::NodeId;
use crate::{Computation, EngineError, EngineId, StateKey, StateVariable};

/// Untyped part of [`EvalContext`].
pub(crate) struct RawContext<'a> {
    pub engine: &'a EngineInner,
    pub node: NodeId,
    pub previous: Option<ErasedValue>,
}

/// Access to the engine from inside a computation body.
///
/// Every read through the context becomes a dependency of the running
/// computation and every write a contribution to the written variable. The
/// edge sets of the computation are replaced with what one run observed, so
/// a dependency only lasts as long as the body keeps reading it.
pub struct EvalContext<'a, T> {
    raw: RawContext<'a>,
    _output: PhantomData<fn() -> T>,
}

impl<'a, T: Send + Sync + 'static> EvalContext<'a, T> {
    pub(crate) fn new(raw: RawContext<'a>) -> Self {
        Self {
            raw,
            _output: PhantomData,
        }
    }

    /// Output of the previous successful run of this computation, if any.
    ///
    /// Lets accumulator-style bodies build on their last result. The value
    /// is gone after the node was evicted.
    pub fn previous(&self) -> Option<Arc<T>> {
        self.raw.previous.clone().map(downcast_value::<T>)
    }

    /// Id of the engine running this body.
    pub fn engine_id(&self) -> EngineId {
        self.raw.engine.id()
    }

    /// Read another computation.
    pub fn read<C: Computation>(&mut self, decl: &C) -> Result<Arc<C::Output>, EngineError> {
        let key = StateKey::computation(self.raw.engine.id(), decl.clone());
        self.raw
            .engine
            .read_key(&key, Some(self.raw.node))
            .map(downcast_value::<C::Output>)
    }

    /// Read several computations in order. Stops at the first error.
    pub fn read_all<C: Computation>(
        &mut self,
        decls: &[C],
    ) -> Result<Vec<Arc<C::Output>>, EngineError> {
        decls.iter().map(|decl| self.read(decl)).collect()
    }

    /// Read a state variable written by other computations.
    pub fn read_variable<V: StateVariable>(
        &mut self,
        var: &V,
    ) -> Result<Arc<V::Output>, EngineError> {
        let key = StateKey::variable(self.raw.engine.id(), var.clone());
        self.raw
            .engine
            .read_key(&key, Some(self.raw.node))
            .map(downcast_value::<V::Output>)
    }

    /// Contribute `input` to a state variable.
    ///
    /// Replaces this computation's earlier contribution. The contribution is
    /// withdrawn when a later run of this computation no longer writes the
    /// variable.
    pub fn write<V: StateVariable>(&mut self, var: &V, input: V::Input) {
        let key = StateKey::variable(self.raw.engine.id(), var.clone());
        self.raw
            .engine
            .write_key(self.raw.node, &key, Arc::new(input));
    }
}
