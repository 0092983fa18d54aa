//! Stateflow: an in-process incremental computation engine.
//!
//! Computations are plain declaration values implementing [`Computation`].
//! The engine caches their outputs together with everything each run read,
//! and re-runs a body only when one of those reads changed.
//!
//! # Key Features
//!
//! - **Automatic dependency capture**: reads through [`EvalContext`] and
//!   through tracked external state ([`TrackedValue`], [`TrackedList`],
//!   [`TrackedMap`], or any provider reporting to a [`DependencyTracker`])
//!   become graph edges
//! - **Minimal re-execution**: direct readers of a change are re-run,
//!   transitive readers first check whether anything they read actually changed
//! - **Multi-writer state**: [`StateVariable`]s collect one contribution per
//!   writing computation and reduce them for readers
//! - **Memoized failures and cycle detection**: errors are cached like values;
//!   a computation reading itself fails with [`EngineError::Cycle`]
//! - **Auto-validation**: [`IncrementalEngine::activate`] keeps a computation
//!   up to date in the background
//! - **Bounded memory**: a segmented LRU evicts nodes without losing any
//!   transitive dependency
//!
//! # Example
//!
//! ```ignore
//! use stateflow::{Computation, EngineError, EvalContext, IncrementalEngine, TrackedList};
//!
//! #[derive(Debug, Clone, PartialEq, Eq, Hash)]
//! struct Sum(TrackedList<i64>);
//!
//! impl Computation for Sum {
//!     type Output = i64;
//!
//!     fn compute(&self, _ctx: &mut EvalContext<'_, i64>) -> Result<i64, EngineError> {
//!         Ok(self.0.to_vec().iter().sum())
//!     }
//! }
//!
//! let engine = IncrementalEngine::new();
//! let values = TrackedList::new(engine.tracker(), vec![1, 2, 3]);
//! assert_eq!(*engine.read_state_variable(&Sum(values.clone()))?, 6);
//!
//! values.set(0, 10);
//! assert_eq!(*engine.read_state_variable(&Sum(values.clone()))?, 15);
//! ```

#![deny(missing_docs)]

mod config;
mod context;
mod declaration;
mod engine;
mod error;
mod graph;
mod invalidation;
mod key;
mod node;
mod slru;
pub mod tracer;
mod tracked;
mod tracking;
mod worker;

pub use config::{EngineBuilder, EngineConfig};
pub use context::EvalContext;
pub use declaration::{Computation, StateVariable};
pub use engine::{ActiveOutput, IncrementalEngine};
pub use error::{ConfigError, EngineError};
pub use key::{CacheKey, DynEq, EngineId, ExternalRef, StateGroup, StateKey};
pub use node::CacheState;
pub use tracer::{NoopTracer, Tracer, ValidationOutcome};
pub use tracked::{TrackedList, TrackedMap, TrackedValue};
pub use tracking::{DependencyListener, DependencyTracker, ListenerId};
