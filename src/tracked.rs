//! Containers that report their reads and writes to a [`DependencyTracker`].
//!
//! Computations that read a tracked container through its accessors depend on
//! exactly what they read: one element, one entry, or the whole container.
//! Elements and entries are grouped under their container, so changing one
//! element invalidates readers of that element and readers of the whole
//! container, but not readers of other elements.
//!
//! Containers compare and hash by identity, so they can be part of a
//! computation declaration.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Debug, Clone, PartialEq, Eq, Hash)]
//! struct Sum(TrackedList<i64>);
//!
//! impl Computation for Sum {
//!     type Output = i64;
//!
//!     fn compute(&self, _ctx: &mut EvalContext<'_, i64>) -> Result<i64, EngineError> {
//!         Ok((0..self.0.len()).filter_map(|i| self.0.get(i)).sum())
//!     }
//! }
//! ```

use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::{DependencyTracker, ExternalRef, StateGroup, StateKey};

static NEXT_CONTAINER: AtomicU64 = AtomicU64::new(1);

fn next_container() -> u64 {
    NEXT_CONTAINER.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ValueRef(u64);

impl StateGroup for ValueRef {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ListRef(u64);

impl StateGroup for ListRef {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ListElementRef {
    list: u64,
    index: usize,
}

impl StateGroup for ListElementRef {
    fn group(&self) -> Option<ExternalRef> {
        Some(ExternalRef::new(ListRef(self.list)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MapRef(u64);

impl StateGroup for MapRef {}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MapEntryRef<K> {
    map: u64,
    key: K,
}

impl<K: Hash + Eq + Debug + Send + Sync + 'static> StateGroup for MapEntryRef<K> {
    fn group(&self) -> Option<ExternalRef> {
        Some(ExternalRef::new(MapRef(self.map)))
    }
}

struct Shared<T> {
    id: u64,
    tracker: DependencyTracker,
    data: RwLock<T>,
}

/// A single tracked value.
pub struct TrackedValue<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + Sync + 'static> TrackedValue<T> {
    /// Create a value reporting to `tracker`.
    pub fn new(tracker: &DependencyTracker, value: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: next_container(),
                tracker: tracker.clone(),
                data: RwLock::new(value),
            }),
        }
    }

    /// Read the value.
    pub fn get(&self) -> T {
        self.shared.tracker.accessed(&self.key());
        self.shared.data.read().clone()
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        *self.shared.data.write() = value;
        self.shared.tracker.modified(&self.key());
    }

    /// Modify the value in place.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.shared.data.write());
        self.shared.tracker.modified(&self.key());
    }

    /// Key this value reports under.
    pub fn key(&self) -> StateKey {
        StateKey::external(ValueRef(self.shared.id))
    }
}

/// A tracked list. Elements are tracked one by one.
pub struct TrackedList<T> {
    shared: Arc<Shared<Vec<T>>>,
}

impl<T: Clone + Send + Sync + 'static> TrackedList<T> {
    /// Create a list reporting to `tracker`.
    pub fn new(tracker: &DependencyTracker, items: Vec<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: next_container(),
                tracker: tracker.clone(),
                data: RwLock::new(items),
            }),
        }
    }

    /// Read the element at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.shared.tracker.accessed(&self.element_key(index));
        self.shared.data.read().get(index).cloned()
    }

    /// Replace the element at `index`, returning the old one. Out of range
    /// indices leave the list unchanged.
    pub fn set(&self, index: usize, value: T) -> Option<T> {
        let old = {
            let mut items = self.shared.data.write();
            let slot = items.get_mut(index)?;
            std::mem::replace(slot, value)
        };
        self.shared.tracker.modified(&self.element_key(index));
        Some(old)
    }

    /// Append an element.
    pub fn push(&self, value: T) {
        let index = {
            let mut items = self.shared.data.write();
            items.push(value);
            items.len() - 1
        };
        self.shared.tracker.modified(&self.element_key(index));
        self.shared.tracker.modified(&self.key());
    }

    /// Number of elements. Depends on the whole list.
    pub fn len(&self) -> usize {
        self.shared.tracker.accessed(&self.key());
        self.shared.data.read().len()
    }

    /// Whether the list is empty. Depends on the whole list.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all elements. Depends on the whole list.
    pub fn to_vec(&self) -> Vec<T> {
        self.shared.tracker.accessed(&self.key());
        self.shared.data.read().clone()
    }

    /// Key of the whole list.
    pub fn key(&self) -> StateKey {
        StateKey::external(ListRef(self.shared.id))
    }

    /// Key of one element.
    pub fn element_key(&self, index: usize) -> StateKey {
        StateKey::external(ListElementRef {
            list: self.shared.id,
            index,
        })
    }
}

/// A tracked map. Entries are tracked one by one; iteration order is
/// insertion order.
pub struct TrackedMap<K, V> {
    shared: Arc<Shared<IndexMap<K, V, ahash::RandomState>>>,
}

impl<K, V> TrackedMap<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty map reporting to `tracker`.
    pub fn new(tracker: &DependencyTracker) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: next_container(),
                tracker: tracker.clone(),
                data: RwLock::new(IndexMap::default()),
            }),
        }
    }

    /// Read the entry for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.shared.tracker.accessed(&self.entry_key(key));
        self.shared.data.read().get(key).cloned()
    }

    /// Whether `key` has an entry.
    pub fn contains_key(&self, key: &K) -> bool {
        self.shared.tracker.accessed(&self.entry_key(key));
        self.shared.data.read().contains_key(key)
    }

    /// Insert or replace an entry, returning the old value.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let entry = self.entry_key(&key);
        let old = self.shared.data.write().insert(key, value);
        self.shared.tracker.modified(&entry);
        old
    }

    /// Remove an entry.
    pub fn remove(&self, key: &K) -> Option<V> {
        let old = self.shared.data.write().shift_remove(key)?;
        self.shared.tracker.modified(&self.entry_key(key));
        Some(old)
    }

    /// Number of entries. Depends on the whole map.
    pub fn len(&self) -> usize {
        self.shared.tracker.accessed(&self.key());
        self.shared.data.read().len()
    }

    /// Whether the map is empty. Depends on the whole map.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys in insertion order. Depends on the whole map.
    pub fn keys(&self) -> Vec<K> {
        self.shared.tracker.accessed(&self.key());
        self.shared.data.read().keys().cloned().collect()
    }

    /// Key of the whole map.
    pub fn key(&self) -> StateKey {
        StateKey::external(MapRef(self.shared.id))
    }

    /// Key of one entry.
    pub fn entry_key(&self, key: &K) -> StateKey {
        StateKey::external(MapEntryRef {
            map: self.shared.id,
            key: key.clone(),
        })
    }
}

macro_rules! identity_traits {
    ($name:ident < $($param:ident),+ >, $label:literal) => {
        impl<$($param),+> Clone for $name<$($param),+> {
            fn clone(&self) -> Self {
                Self {
                    shared: self.shared.clone(),
                }
            }
        }

        impl<$($param),+> PartialEq for $name<$($param),+> {
            fn eq(&self, other: &Self) -> bool {
                self.shared.id == other.shared.id
            }
        }

        impl<$($param),+> Eq for $name<$($param),+> {}

        impl<$($param),+> Hash for $name<$($param),+> {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.shared.id.hash(state);
            }
        }

        impl<$($param),+> Debug for $name<$($param),+> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.shared.id)
            }
        }
    };
}

identity_traits!(TrackedValue<T>, "TrackedValue");
identity_traits!(TrackedList<T>, "TrackedList");
identity_traits!(TrackedMap<K, V>, "TrackedMap");
