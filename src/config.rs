//! Engine configuration and builder.

use std::sync::Arc;

use crate::tracer::{NoopTracer, Tracer};
use crate::{ConfigError, DependencyTracker, IncrementalEngine};

/// Tunables of an [`IncrementalEngine`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Number of engine-internal nodes kept before eviction engages.
    pub max_size: usize,
    /// Share of `max_size` reserved for nodes accessed more than once.
    pub protected_ratio: f64,
    /// Capacity of the auto-validation queue; `None` means unbounded.
    pub queue_capacity: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_size: 100_000,
            protected_ratio: 0.5,
            queue_capacity: None,
        }
    }
}

impl EngineConfig {
    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::ZeroMaxSize);
        }
        if !(0.0..=1.0).contains(&self.protected_ratio) {
            return Err(ConfigError::InvalidProtectedRatio(self.protected_ratio));
        }
        if self.queue_capacity == Some(0) {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        Ok(())
    }
}

/// Builder for [`IncrementalEngine`] with custom configuration.
///
/// # Example
///
/// ```ignore
/// let tracker = DependencyTracker::new();
/// let engine = IncrementalEngine::builder()
///     .max_size(10_000)
///     .protected_ratio(0.8)
///     .tracker(tracker.clone())
///     .build()?;
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    tracker: Option<DependencyTracker>,
    tracer: Option<Arc<dyn Tracer>>,
}

impl EngineBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Node budget before eviction engages.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.config.max_size = max_size;
        self
    }

    /// Share of the budget reserved for the protected segment.
    pub fn protected_ratio(mut self, ratio: f64) -> Self {
        self.config.protected_ratio = ratio;
        self
    }

    /// Bound the auto-validation queue.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = Some(capacity);
        self
    }

    /// Share a dependency tracker with external state and other engines.
    ///
    /// Without this the engine creates its own.
    pub fn tracker(mut self, tracker: DependencyTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Observe engine events.
    pub fn tracer<T: Tracer>(mut self, tracer: T) -> Self {
        self.tracer = Some(Arc::new(tracer));
        self
    }

    /// Build the engine.
    pub fn build(self) -> Result<IncrementalEngine, ConfigError> {
        self.config.validate()?;
        Ok(IncrementalEngine::from_parts(
            self.config,
            self.tracker.unwrap_or_default(),
            self.tracer.unwrap_or_else(|| Arc::new(NoopTracer)),
        ))
    }
}
