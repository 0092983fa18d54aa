use indexmap::{IndexMap, IndexSet};

use crate::declaration::ErasedValue;
use crate::{EngineError, StateKey};

/// Slot index of a node in the graph arena.
pub(crate) type NodeId = usize;

/// Monotonic change counter shared by all nodes of one graph.
pub(crate) type Revision = u64;

/// Ordered set of node ids.
pub(crate) type EdgeSet = IndexSet<NodeId, ahash::RandomState>;

/// Kind of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum EdgeType {
    /// `from` read `to`; a change of `to` invalidates `from`.
    Read,
    /// `from` contributed a value to the state variable `to`.
    Write,
}

impl EdgeType {
    pub(crate) const ALL: [EdgeType; 2] = [EdgeType::Read, EdgeType::Write];

    fn index(self) -> usize {
        match self {
            EdgeType::Read => 0,
            EdgeType::Write => 1,
        }
    }
}

/// Cache state of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CacheState {
    /// Never validated.
    New,
    /// The body (or the check of its dependencies) is running.
    Validating,
    /// Holds an up-to-date value.
    Valid,
    /// Holds an up-to-date error.
    Failed,
    /// A direct dependency changed.
    Invalid,
    /// Something further down the dependency chain may have changed.
    DependencyInvalid,
}

impl CacheState {
    /// Returns `true` for `Invalid` and `DependencyInvalid`.
    pub fn is_invalid(self) -> bool {
        matches!(self, CacheState::Invalid | CacheState::DependencyInvalid)
    }

    /// Returns `true` when the node holds a result that can be handed out.
    pub fn is_settled(self) -> bool {
        matches!(self, CacheState::Valid | CacheState::Failed)
    }
}

/// Values of an internal state variable.
#[derive(Default)]
pub(crate) struct StateSlot {
    /// Contribution of each writer, in first-write order.
    pub writers: IndexMap<NodeId, ErasedValue, ahash::RandomState>,
    /// Reduced output, dropped whenever a contribution changes.
    pub output: Option<ErasedValue>,
}

/// Dependencies recorded while a body runs.
#[derive(Default)]
pub(crate) struct Observed {
    pub reads: EdgeSet,
    pub writes: EdgeSet,
}

pub(crate) struct ComputationSlot {
    pub state: CacheState,
    pub result: Option<Result<ErasedValue, EngineError>>,
    /// Revision at which `result` was last confirmed.
    pub validated_at: Revision,
    /// `Some` while the body runs.
    pub observed: Option<Observed>,
    /// Something the running body already read has changed since.
    pub changed_while_running: bool,
}

impl ComputationSlot {
    fn new() -> Self {
        Self {
            state: CacheState::New,
            result: None,
            validated_at: 0,
            observed: None,
            changed_while_running: false,
        }
    }
}

pub(crate) enum NodeKind {
    External,
    State(StateSlot),
    Computation(ComputationSlot),
}

/// A graph node. Edges are stored on both ends.
pub(crate) struct Node {
    pub key: StateKey,
    pub kind: NodeKind,
    dependencies: [EdgeSet; 2],
    dependents: [EdgeSet; 2],
    /// Revision of the last observable change.
    pub changed_at: Revision,
    /// Something this node transitively reads may be out of date.
    pub stale: bool,
    /// Live callers currently reading this node.
    pub pins: u32,
    /// Number of active handles keeping this node auto-validated.
    pub auto_validated: u32,
}

impl Node {
    pub(crate) fn new(key: StateKey) -> Self {
        let kind = if key.is_external() {
            NodeKind::External
        } else if key.is_computation() {
            NodeKind::Computation(ComputationSlot::new())
        } else {
            NodeKind::State(StateSlot::default())
        };
        Self {
            key,
            kind,
            dependencies: Default::default(),
            dependents: Default::default(),
            changed_at: 0,
            stale: false,
            pins: 0,
            auto_validated: 0,
        }
    }

    pub(crate) fn dependencies(&self, ty: EdgeType) -> &EdgeSet {
        &self.dependencies[ty.index()]
    }

    pub(crate) fn dependencies_mut(&mut self, ty: EdgeType) -> &mut EdgeSet {
        &mut self.dependencies[ty.index()]
    }

    pub(crate) fn dependents(&self, ty: EdgeType) -> &EdgeSet {
        &self.dependents[ty.index()]
    }

    pub(crate) fn dependents_mut(&mut self, ty: EdgeType) -> &mut EdgeSet {
        &mut self.dependents[ty.index()]
    }

    pub(crate) fn has_edges(&self) -> bool {
        EdgeType::ALL
            .iter()
            .any(|ty| !self.dependencies(*ty).is_empty() || !self.dependents(*ty).is_empty())
    }

    pub(crate) fn is_external(&self) -> bool {
        matches!(self.kind, NodeKind::External)
    }

    pub(crate) fn computation(&self) -> Option<&ComputationSlot> {
        match &self.kind {
            NodeKind::Computation(slot) => Some(slot),
            _ => None,
        }
    }

    pub(crate) fn computation_mut(&mut self) -> Option<&mut ComputationSlot> {
        match &mut self.kind {
            NodeKind::Computation(slot) => Some(slot),
            _ => None,
        }
    }

    pub(crate) fn state_slot_mut(&mut self) -> Option<&mut StateSlot> {
        match &mut self.kind {
            NodeKind::State(slot) => Some(slot),
            _ => None,
        }
    }

    pub(crate) fn cache_state(&self) -> Option<CacheState> {
        self.computation().map(|slot| slot.state)
    }

    pub(crate) fn is_validating(&self) -> bool {
        self.cache_state() == Some(CacheState::Validating)
    }

    /// Whether an update has to do any work before handing out a result.
    pub(crate) fn needs_update(&self) -> bool {
        match &self.kind {
            NodeKind::Computation(slot) => self.stale || !slot.state.is_settled(),
            _ => false,
        }
    }

    pub(crate) fn is_root(&self) -> bool {
        self.pins > 0 || self.auto_validated > 0
    }
}
