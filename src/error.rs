//! Error types for engine reads and computation bodies.

use std::fmt;
use std::sync::Arc;

/// Errors surfaced by engine reads.
///
/// Computation bodies return `Result<T, EngineError>`, so any error a body
/// propagates with `?` is stored on its node and handed back unchanged to every
/// later reader until a dependency changes. User errors convert automatically
/// through the blanket `From` impl below.
#[derive(Debug, Clone)]
pub enum EngineError {
    /// Dependency cycle detected.
    ///
    /// `path` holds the debug representation of every reference from the
    /// repeated one up to the point of detection, in evaluation order.
    Cycle {
        /// Debug representation of the references forming the cycle.
        path: Vec<String>,
    },

    /// The engine was disposed before this call.
    Disposed,

    /// Error raised by a computation body.
    ///
    /// The `Arc` makes the memoized failure cheap to re-raise: every reader
    /// gets a handle to the same error value.
    UserError(Arc<anyhow::Error>),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Cycle { path } => {
                write!(f, "dependency cycle detected: {}", path.join(" -> "))
            }
            EngineError::Disposed => write!(f, "engine is disposed"),
            EngineError::UserError(e) => write!(f, "computation failed: {}", e),
        }
    }
}

impl<T: Into<anyhow::Error>> From<T> for EngineError {
    fn from(err: T) -> Self {
        EngineError::UserError(Arc::new(err.into()))
    }
}

impl EngineError {
    /// Returns the inner user error if this is a `UserError` variant.
    pub fn user_error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            EngineError::UserError(e) => Some(e),
            _ => None,
        }
    }

    /// Attempts to downcast the user error to a specific type.
    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.user_error().and_then(|e| e.downcast_ref::<E>())
    }

    /// Returns `true` if this is a `UserError` containing an error of type `E`.
    pub fn is<E: std::error::Error + Send + Sync + 'static>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }

    /// Returns `true` for cycle errors.
    pub fn is_cycle(&self) -> bool {
        matches!(self, EngineError::Cycle { .. })
    }
}

/// Rejected engine configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The node budget must allow at least one node.
    #[error("max_size must be greater than zero")]
    ZeroMaxSize,

    /// The protected segment ratio must lie in `0.0..=1.0`.
    #[error("protected_ratio must be within 0.0..=1.0, got {0}")]
    InvalidProtectedRatio(f64),

    /// A bounded auto-validation queue needs room for at least one entry.
    #[error("queue_capacity must be greater than zero when set")]
    ZeroQueueCapacity,
}
