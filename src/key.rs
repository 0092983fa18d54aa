//! Type-erased references used as graph keys.

use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dyn_hash::DynHash;

use crate::declaration::{ErasedComputation, ErasedVariable};

/// Object-safe equality comparison.
///
/// Two trait objects compare equal only if they share a concrete type and
/// that type's `Eq` says so.
pub trait DynEq: Any {
    /// Compare self with another value for equality.
    fn dyn_eq(&self, other: &dyn Any) -> bool;
}

impl<T: Eq + 'static> DynEq for T {
    fn dyn_eq(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|o| self == o)
    }
}

/// Object-safe hashing, equality and debug formatting.
///
/// Implemented for every `Hash + Eq + Debug + Send + Sync + 'static` type.
pub trait CacheKey: DynHash + DynEq + Debug + Send + Sync {
    /// Get the key as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Get the type name for this key.
    fn type_name(&self) -> &'static str;
}

impl<T: Hash + Eq + Debug + Send + Sync + 'static> CacheKey for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

dyn_hash::hash_trait_object!(CacheKey);

/// Identity of an engine instance.
///
/// Engine-bound references carry the id of the engine they belong to, so the
/// same declaration read through two engines maps to two distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(u64);

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

impl EngineId {
    pub(crate) fn next() -> Self {
        EngineId(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of state living outside the engine.
///
/// External state providers implement this for the handles they pass to
/// [`DependencyTracker::accessed`](crate::DependencyTracker::accessed) and
/// [`DependencyTracker::modified`](crate::DependencyTracker::modified).
///
/// `group` returns the coarser identity this one belongs to, e.g. the list an
/// element lives in. A modification of a member invalidates everything that
/// depends on the group. Group chains must be acyclic.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// struct Cell { sheet: u32, row: u32, col: u32 }
///
/// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// struct Sheet(u32);
///
/// impl StateGroup for Cell {
///     fn group(&self) -> Option<ExternalRef> {
///         Some(ExternalRef::new(Sheet(self.sheet)))
///     }
/// }
///
/// impl StateGroup for Sheet {}
/// ```
pub trait StateGroup: Hash + Eq + Debug + Send + Sync + 'static {
    /// The parent group of this reference, if any.
    fn group(&self) -> Option<ExternalRef> {
        None
    }
}

trait ErasedExternal: CacheKey {
    fn group(&self) -> Option<ExternalRef>;
    fn as_key(&self) -> &dyn CacheKey;
}

impl<T: StateGroup> ErasedExternal for T {
    fn group(&self) -> Option<ExternalRef> {
        StateGroup::group(self)
    }

    fn as_key(&self) -> &dyn CacheKey {
        self
    }
}

/// Type-erased handle to external state.
#[derive(Clone)]
pub struct ExternalRef {
    ref_type: TypeId,
    key: Arc<dyn ErasedExternal>,
}

impl ExternalRef {
    /// Wrap an external identity.
    pub fn new<T: StateGroup>(key: T) -> Self {
        Self {
            ref_type: TypeId::of::<T>(),
            key: Arc::new(key),
        }
    }

    /// Parent group of this reference.
    pub fn group(&self) -> Option<ExternalRef> {
        self.key.group()
    }

    /// Downcast the identity to its original type.
    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        self.key.as_any().downcast_ref()
    }

    /// Get the debug representation of this reference.
    pub fn debug_repr(&self) -> String {
        format!("{:?}", self.key)
    }
}

impl Debug for ExternalRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.key)
    }
}

impl Hash for ExternalRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ref_type.hash(state);
        self.key.as_key().hash(state);
    }
}

impl PartialEq for ExternalRef {
    fn eq(&self, other: &Self) -> bool {
        self.ref_type == other.ref_type && self.key.dyn_eq(other.key.as_any())
    }
}

impl Eq for ExternalRef {}

#[derive(Clone)]
enum KeyRepr {
    Computation {
        engine: EngineId,
        decl_type: TypeId,
        decl: Arc<dyn ErasedComputation>,
    },
    Variable {
        engine: EngineId,
        decl_type: TypeId,
        decl: Arc<dyn ErasedVariable>,
    },
    External(ExternalRef),
}

/// Reference to a state variable: a declaration bound to an engine, or an
/// external identity.
///
/// Cheap to clone. Equality compares the engine, the declaration type and the
/// declaration value.
#[derive(Clone)]
pub struct StateKey(KeyRepr);

impl StateKey {
    pub(crate) fn computation<C: crate::Computation>(engine: EngineId, decl: C) -> Self {
        StateKey(KeyRepr::Computation {
            engine,
            decl_type: TypeId::of::<C>(),
            decl: Arc::new(decl),
        })
    }

    pub(crate) fn variable<V: crate::StateVariable>(engine: EngineId, decl: V) -> Self {
        StateKey(KeyRepr::Variable {
            engine,
            decl_type: TypeId::of::<V>(),
            decl: Arc::new(decl),
        })
    }

    /// Key for an external identity.
    pub fn external<T: StateGroup>(key: T) -> Self {
        StateKey(KeyRepr::External(ExternalRef::new(key)))
    }

    /// The engine this reference is bound to, `None` for external references.
    pub fn engine(&self) -> Option<EngineId> {
        match &self.0 {
            KeyRepr::Computation { engine, .. } | KeyRepr::Variable { engine, .. } => Some(*engine),
            KeyRepr::External(_) => None,
        }
    }

    /// Returns `true` for external references.
    pub fn is_external(&self) -> bool {
        matches!(self.0, KeyRepr::External(_))
    }

    /// Returns `true` for references to executable declarations.
    pub fn is_computation(&self) -> bool {
        matches!(self.0, KeyRepr::Computation { .. })
    }

    /// The external identity, if this is an external reference.
    pub fn as_external(&self) -> Option<&ExternalRef> {
        match &self.0 {
            KeyRepr::External(r) => Some(r),
            _ => None,
        }
    }

    /// Parent group. Engine-bound references never have one.
    pub fn group(&self) -> Option<StateKey> {
        match &self.0 {
            KeyRepr::External(r) => r.group().map(|g| StateKey(KeyRepr::External(g))),
            _ => None,
        }
    }

    /// Downcast the declaration or external identity to its original type.
    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        match &self.0 {
            KeyRepr::Computation { decl, .. } => decl.as_key().as_any().downcast_ref(),
            KeyRepr::Variable { decl, .. } => decl.as_key().as_any().downcast_ref(),
            KeyRepr::External(r) => r.downcast(),
        }
    }

    /// Get the debug representation of this key.
    pub fn debug_repr(&self) -> String {
        format!("{:?}", self)
    }

    /// Type name of the declaration or external identity.
    pub fn type_name(&self) -> &'static str {
        match &self.0 {
            KeyRepr::Computation { decl, .. } => decl.as_key().type_name(),
            KeyRepr::Variable { decl, .. } => decl.as_key().type_name(),
            KeyRepr::External(r) => r.key.type_name(),
        }
    }

    pub(crate) fn as_computation(&self) -> Option<&Arc<dyn ErasedComputation>> {
        match &self.0 {
            KeyRepr::Computation { decl, .. } => Some(decl),
            _ => None,
        }
    }

    pub(crate) fn as_variable(&self) -> Option<&Arc<dyn ErasedVariable>> {
        match &self.0 {
            KeyRepr::Variable { decl, .. } => Some(decl),
            _ => None,
        }
    }
}

impl Debug for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            KeyRepr::Computation { decl, .. } => write!(f, "{:?}", decl.as_key()),
            KeyRepr::Variable { decl, .. } => write!(f, "{:?}", decl.as_key()),
            KeyRepr::External(r) => write!(f, "{:?}", r),
        }
    }
}

impl Hash for StateKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            KeyRepr::Computation {
                engine,
                decl_type,
                decl,
            } => {
                engine.hash(state);
                decl_type.hash(state);
                decl.as_key().hash(state);
            }
            KeyRepr::Variable {
                engine,
                decl_type,
                decl,
            } => {
                engine.hash(state);
                decl_type.hash(state);
                decl.as_key().hash(state);
            }
            KeyRepr::External(r) => r.hash(state),
        }
    }
}

impl PartialEq for StateKey {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (
                KeyRepr::Computation {
                    engine: e1,
                    decl_type: t1,
                    decl: d1,
                },
                KeyRepr::Computation {
                    engine: e2,
                    decl_type: t2,
                    decl: d2,
                },
            ) => e1 == e2 && t1 == t2 && d1.as_key().dyn_eq(d2.as_key().as_any()),
            (
                KeyRepr::Variable {
                    engine: e1,
                    decl_type: t1,
                    decl: d1,
                },
                KeyRepr::Variable {
                    engine: e2,
                    decl_type: t2,
                    decl: d2,
                },
            ) => e1 == e2 && t1 == t2 && d1.as_key().dyn_eq(d2.as_key().as_any()),
            (KeyRepr::External(a), KeyRepr::External(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for StateKey {}

impl From<ExternalRef> for StateKey {
    fn from(r: ExternalRef) -> Self {
        StateKey(KeyRepr::External(r))
    }
}
