//! Dependency tracking fan-out.
//!
//! External state providers report reads and writes of their state to a
//! [`DependencyTracker`]; the tracker forwards each event to every registered
//! listener. Engines register themselves as listeners: reads turn into graph
//! edges of the running computation, writes into invalidations.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use slab::Slab;

use crate::StateKey;

/// Receiver of tracking events.
pub trait DependencyListener: Send + Sync {
    /// State identified by `key` was read.
    fn accessed(&self, key: &StateKey);

    /// State identified by `key` was changed.
    fn modified(&self, key: &StateKey);
}

/// Handle returned by [`DependencyTracker::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

/// Registry of dependency listeners.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone, Default)]
pub struct DependencyTracker {
    listeners: Arc<RwLock<Slab<Arc<dyn DependencyListener>>>>,
}

impl DependencyTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener.
    pub fn register(&self, listener: Arc<dyn DependencyListener>) -> ListenerId {
        ListenerId(self.listeners.write().insert(listener))
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        self.listeners.write().try_remove(id.0).is_some()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Report a read.
    pub fn accessed(&self, key: &StateKey) {
        self.notify("accessed", key, |listener| listener.accessed(key));
    }

    /// Report a change.
    pub fn modified(&self, key: &StateKey) {
        self.notify("modified", key, |listener| listener.modified(key));
    }

    fn notify(&self, event: &'static str, key: &StateKey, f: impl Fn(&dyn DependencyListener)) {
        // Listeners may (un)register while being notified.
        let listeners: Vec<Arc<dyn DependencyListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))).is_err() {
                tracing::error!(event, key = ?key, "dependency listener panicked");
            }
        }
    }
}

impl fmt::Debug for DependencyTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyTracker")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Cell(u32);

    impl crate::StateGroup for Cell {}

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl DependencyListener for Recorder {
        fn accessed(&self, key: &StateKey) {
            self.events.lock().push(format!("accessed {:?}", key));
        }

        fn modified(&self, key: &StateKey) {
            self.events.lock().push(format!("modified {:?}", key));
        }
    }

    struct Broken;

    impl DependencyListener for Broken {
        fn accessed(&self, _key: &StateKey) {
            panic!("broken listener");
        }

        fn modified(&self, _key: &StateKey) {
            panic!("broken listener");
        }
    }

    #[test]
    fn test_fan_out() {
        let tracker = DependencyTracker::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        tracker.register(first.clone());
        tracker.register(second.clone());

        tracker.accessed(&StateKey::external(Cell(1)));
        tracker.modified(&StateKey::external(Cell(2)));

        let expected = vec!["accessed Cell(1)".to_string(), "modified Cell(2)".to_string()];
        assert_eq!(*first.events.lock(), expected);
        assert_eq!(*second.events.lock(), expected);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let tracker = DependencyTracker::new();
        tracker.register(Arc::new(Broken));
        let recorder = Arc::new(Recorder::default());
        tracker.register(recorder.clone());

        tracker.modified(&StateKey::external(Cell(3)));
        assert_eq!(recorder.events.lock().len(), 1);
    }

    #[test]
    fn test_unregister() {
        let tracker = DependencyTracker::new();
        let recorder = Arc::new(Recorder::default());
        let id = tracker.register(recorder.clone());
        assert_eq!(tracker.listener_count(), 1);
        assert!(tracker.unregister(id));
        assert!(!tracker.unregister(id));

        tracker.accessed(&StateKey::external(Cell(1)));
        assert!(recorder.events.lock().is_empty());
    }
}
