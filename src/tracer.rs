//! Tracer trait for observing engine execution.
//!
//! The default [`NoopTracer`] ignores everything. Install a tracer through
//! [`EngineBuilder::tracer`](crate::EngineBuilder::tracer) to count body
//! runs, record invalidations or forward events elsewhere.
//!
//! # Example
//!
//! ```ignore
//! struct PrintTracer;
//!
//! impl Tracer for PrintTracer {
//!     fn on_validation_start(&self, key: &StateKey) {
//!         println!("running {:?}", key);
//!     }
//! }
//!
//! let engine = IncrementalEngine::builder().tracer(PrintTracer).build()?;
//! ```

use crate::{CacheState, StateKey};

/// How a validation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The body ran and produced a new output.
    Changed,
    /// The body ran and its output equals the previous one.
    Unchanged,
    /// Dependencies were unchanged; the body did not run.
    Verified,
    /// The body failed.
    Failed {
        /// Display form of the error.
        message: String,
    },
}

/// Observer of engine events.
///
/// Every method has an empty default. Methods are called while the engine's
/// critical section is held and must not call back into the engine.
pub trait Tracer: Send + Sync + 'static {
    /// A computation is about to run its body.
    #[inline]
    fn on_validation_start(&self, _key: &StateKey) {}

    /// A validation finished.
    #[inline]
    fn on_validation_end(&self, _key: &StateKey, _outcome: &ValidationOutcome) {}

    /// A settled computation was invalidated.
    #[inline]
    fn on_invalidated(&self, _key: &StateKey, _state: CacheState) {}

    /// A read closed a dependency cycle.
    #[inline]
    fn on_cycle_detected(&self, _path: &[String]) {}

    /// A node was removed from the graph to bound memory.
    #[inline]
    fn on_evicted(&self, _key: &StateKey) {}
}

/// Tracer that discards all events.
pub struct NoopTracer;

impl Tracer for NoopTracer {}
