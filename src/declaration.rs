//! Declarations of state variables and computations.

use std::any::Any;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crate::context::{EvalContext, RawContext};
use crate::key::CacheKey;
use crate::EngineError;

/// Type-erased value stored on graph nodes.
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

/// A state variable written by computations.
///
/// The declaration value itself is the identity: two equal declarations name
/// the same variable. Every computation that writes the variable contributes
/// one input; readers see `reduce` over the current contributions, or
/// `default_output` when nobody writes it.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// struct Total;
///
/// impl StateVariable for Total {
///     type Input = i64;
///     type Output = i64;
///
///     fn default_output(&self) -> i64 {
///         0
///     }
///
///     fn reduce(&self, inputs: &[&i64]) -> i64 {
///         inputs.iter().copied().sum()
///     }
/// }
/// ```
pub trait StateVariable: Hash + Eq + Clone + Debug + Send + Sync + 'static {
    /// Value contributed by a single writer.
    type Input: Send + Sync + 'static;

    /// Value seen by readers.
    type Output: Send + Sync + 'static;

    /// Output when no computation writes this variable.
    fn default_output(&self) -> Self::Output;

    /// Combine the contributions of all current writers, in the order the
    /// writers first wrote.
    fn reduce(&self, inputs: &[&Self::Input]) -> Self::Output;
}

/// A state variable whose value is produced by running a body.
///
/// The body gets an [`EvalContext`] and must do every engine read and write
/// through it; external state is tracked through the engine's
/// [`DependencyTracker`](crate::DependencyTracker).
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// struct Double(u32);
///
/// impl Computation for Double {
///     type Output = u64;
///
///     fn compute(&self, ctx: &mut EvalContext<'_, u64>) -> Result<u64, EngineError> {
///         let base = ctx.read(&Base(self.0))?;
///         Ok(*base * 2)
///     }
/// }
/// ```
pub trait Computation: Hash + Eq + Clone + Debug + Send + Sync + 'static {
    /// Result of the body.
    type Output: Send + Sync + 'static;

    /// Run the body.
    fn compute(&self, ctx: &mut EvalContext<'_, Self::Output>)
        -> Result<Self::Output, EngineError>;

    /// Compare two outputs for early cutoff.
    ///
    /// When a re-run produces an output equal to the previous one, readers
    /// that were only invalidated transitively keep their cached values. The
    /// default treats every re-run as a change.
    fn output_eq(_old: &Self::Output, _new: &Self::Output) -> bool {
        false
    }
}

pub(crate) trait ErasedComputation: CacheKey {
    fn as_key(&self) -> &dyn CacheKey;

    fn compute_erased(&self, ctx: RawContext<'_>) -> Result<ErasedValue, EngineError>;

    fn output_eq_erased(&self, old: &ErasedValue, new: &ErasedValue) -> bool;
}

impl<C: Computation> ErasedComputation for C {
    fn as_key(&self) -> &dyn CacheKey {
        self
    }

    fn compute_erased(&self, ctx: RawContext<'_>) -> Result<ErasedValue, EngineError> {
        let mut ctx = EvalContext::<C::Output>::new(ctx);
        let output = self.compute(&mut ctx)?;
        Ok(Arc::new(output) as ErasedValue)
    }

    fn output_eq_erased(&self, old: &ErasedValue, new: &ErasedValue) -> bool {
        match (old.downcast_ref::<C::Output>(), new.downcast_ref::<C::Output>()) {
            (Some(old), Some(new)) => C::output_eq(old, new),
            _ => false,
        }
    }
}

pub(crate) trait ErasedVariable: CacheKey {
    fn as_key(&self) -> &dyn CacheKey;

    fn default_erased(&self) -> ErasedValue;

    fn reduce_erased(&self, inputs: &[&ErasedValue]) -> ErasedValue;
}

impl<V: StateVariable> ErasedVariable for V {
    fn as_key(&self) -> &dyn CacheKey {
        self
    }

    fn default_erased(&self) -> ErasedValue {
        Arc::new(self.default_output())
    }

    fn reduce_erased(&self, inputs: &[&ErasedValue]) -> ErasedValue {
        let typed: Vec<&V::Input> = inputs
            .iter()
            .filter_map(|input| input.downcast_ref::<V::Input>())
            .collect();
        debug_assert_eq!(typed.len(), inputs.len(), "writer contribution type mismatch");
        Arc::new(self.reduce(&typed))
    }
}

/// Recover a typed output from a node value.
///
/// Keys carry the declaration type, so a mismatch means the graph handed out
/// a value for the wrong node.
pub(crate) fn downcast_value<T: Send + Sync + 'static>(value: ErasedValue) -> Arc<T> {
    match value.downcast::<T>() {
        Ok(value) => value,
        Err(_) => panic!(
            "node value is not of type {}",
            std::any::type_name::<T>()
        ),
    }
}
