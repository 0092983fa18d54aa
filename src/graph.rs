//! Node and edge store.
//!
//! Nodes live in a slab and refer to each other by slot index; every edge is
//! recorded on both of its ends. Memory is bounded by a segmented LRU over
//! internal nodes: evicted nodes are removed only when nothing depends on
//! them being present, and their edges are spliced onto their dependents so
//! no transitive dependency is lost.

use std::collections::{HashMap, VecDeque};

use std::sync::Arc;

use slab::Slab;

use crate::declaration::{ErasedValue, ErasedVariable};
use crate::invalidation::Invalidated;
use crate::node::{CacheState, EdgeSet, EdgeType, Node, NodeId, NodeKind, Observed, Revision};
use crate::slru::Slru;
use crate::{EngineConfig, EngineError, StateKey};

/// Result of looking up a state variable's output.
pub(crate) enum StateOutput {
    Cached(ErasedValue),
    Reduce {
        decl: Arc<dyn ErasedVariable>,
        inputs: Vec<ErasedValue>,
    },
}

/// READ-dependency count above which dependencies on members of the same
/// external group are collapsed into one edge to the group.
pub(crate) const SHRINK_THRESHOLD: usize = 16;

pub(crate) struct Graph {
    nodes: Slab<Node>,
    index: HashMap<StateKey, NodeId, ahash::RandomState>,
    slru: Slru<NodeId>,
    pending_evictions: Vec<NodeId>,
    /// Evicted ids whose removal was refused while a validation was running.
    deferred_evictions: Vec<NodeId>,
    roots: EdgeSet,
    revision: Revision,
}

impl Graph {
    pub(crate) fn new(config: &EngineConfig) -> Self {
        Self {
            nodes: Slab::new(),
            index: HashMap::default(),
            slru: Slru::new(config.max_size, config.protected_ratio),
            pending_evictions: Vec::new(),
            deferred_evictions: Vec::new(),
            roots: EdgeSet::default(),
            revision: 0,
        }
    }

    pub(crate) fn bump_revision(&mut self) -> Revision {
        self.revision += 1;
        self.revision
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub(crate) fn lookup(&self, key: &StateKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    /// Resolve a key, creating the node (and its group chain) on first use.
    pub(crate) fn get_or_add_node(&mut self, key: &StateKey) -> NodeId {
        if let Some(id) = self.lookup(key) {
            return id;
        }
        let id = self.nodes.insert(Node::new(key.clone()));
        self.index.insert(key.clone(), id);
        if let Some(group) = key.group() {
            let parent = self.get_or_add_node(&group);
            self.add_dependency(parent, id, EdgeType::Read);
        }
        self.touch(id);
        id
    }

    /// Resolve a key on behalf of a caller: existing nodes count as a hit.
    pub(crate) fn access(&mut self, key: &StateKey) -> NodeId {
        match self.lookup(key) {
            Some(id) => {
                self.touch(id);
                id
            }
            None => self.get_or_add_node(key),
        }
    }

    /// Record an access for eviction purposes. External nodes are not
    /// tracked; they go away once unused.
    pub(crate) fn touch(&mut self, id: NodeId) {
        if self.nodes[id].is_external() {
            return;
        }
        let evicted = self.slru.touch(id);
        self.pending_evictions.extend(evicted);
    }

    pub(crate) fn take_pending_evictions(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.pending_evictions)
    }

    /// Remember an id that fell out of the SLRU but could not be removed yet.
    pub(crate) fn defer_eviction(&mut self, id: NodeId) {
        self.deferred_evictions.push(id);
    }

    /// Deferred ids still worth retrying: present and not re-admitted to the
    /// SLRU by a later access.
    pub(crate) fn take_deferred_evictions(&mut self) -> Vec<NodeId> {
        let deferred = std::mem::take(&mut self.deferred_evictions);
        deferred
            .into_iter()
            .filter(|id| self.nodes.contains(*id) && !self.slru.contains(id))
            .collect()
    }

    pub(crate) fn dependencies(&self, id: NodeId, ty: EdgeType) -> &EdgeSet {
        self.nodes[id].dependencies(ty)
    }

    pub(crate) fn dependents(&self, id: NodeId, ty: EdgeType) -> &EdgeSet {
        self.nodes[id].dependents(ty)
    }

    /// Add `from → to`. Self loops are ignored. Returns whether the edge is new.
    pub(crate) fn add_dependency(&mut self, from: NodeId, to: NodeId, ty: EdgeType) -> bool {
        if from == to {
            return false;
        }
        assert!(
            self.nodes.contains(from) && self.nodes.contains(to),
            "edge endpoints must be registered nodes"
        );
        if !self.nodes[from].dependencies_mut(ty).insert(to) {
            return false;
        }
        let inserted = self.nodes[to].dependents_mut(ty).insert(from);
        debug_assert!(inserted, "asymmetric edge {from} -> {to}");
        true
    }

    /// Remove `from → to`. Returns whether the edge existed.
    pub(crate) fn remove_dependency(&mut self, from: NodeId, to: NodeId, ty: EdgeType) -> bool {
        if !self.nodes[from].dependencies_mut(ty).shift_remove(&to) {
            return false;
        }
        let removed = self.nodes[to].dependents_mut(ty).shift_remove(&from);
        debug_assert!(removed, "asymmetric edge {from} -> {to}");
        true
    }

    /// Replace the `ty` dependencies of `from` with `new`, touching only the
    /// edges that differ, and keep them in the order of `new`. Returns the
    /// removed targets.
    pub(crate) fn set_dependencies(
        &mut self,
        from: NodeId,
        new: &EdgeSet,
        ty: EdgeType,
    ) -> Vec<NodeId> {
        let removed: Vec<NodeId> = self.nodes[from]
            .dependencies(ty)
            .iter()
            .filter(|to| !new.contains(*to))
            .copied()
            .collect();
        for to in &removed {
            self.remove_dependency(from, *to, ty);
        }
        for to in new {
            if self.nodes.contains(*to) {
                self.add_dependency(from, *to, ty);
            }
        }
        let current = self.nodes[from].dependencies(ty);
        let ordered: EdgeSet = new
            .iter()
            .filter(|to| current.contains(*to))
            .copied()
            .collect();
        debug_assert_eq!(ordered.len(), current.len());
        *self.nodes[from].dependencies_mut(ty) = ordered;
        removed
    }

    pub(crate) fn acquire_root(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        node.auto_validated += 1;
        self.roots.insert(id);
    }

    pub(crate) fn release_root(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.auto_validated = node.auto_validated.saturating_sub(1);
        if node.auto_validated == 0 {
            self.roots.shift_remove(&id);
            if !node.is_external() && !self.slru.contains(&id) {
                self.deferred_evictions.push(id);
            }
        }
    }

    /// Auto-validated nodes that need an update.
    pub(crate) fn pending_roots(&self) -> Vec<NodeId> {
        self.roots
            .iter()
            .copied()
            .filter(|id| self.nodes[*id].needs_update())
            .collect()
    }

    /// Whether `id` can be reached from a root by following READ edges
    /// towards dependents.
    pub(crate) fn is_reachable(&self, id: NodeId, memo: &mut HashMap<NodeId, bool>) -> bool {
        if let Some(known) = memo.get(&id) {
            return *known;
        }
        let mut visited = vec![id];
        let mut queue = VecDeque::from([id]);
        let mut reachable = false;
        while let Some(current) = queue.pop_front() {
            if memo.get(&current) == Some(&true) || self.nodes[current].is_root() {
                reachable = true;
                break;
            }
            for dependent in self.nodes[current].dependents(EdgeType::Read) {
                if memo.contains_key(dependent) || visited.contains(dependent) {
                    continue;
                }
                visited.push(*dependent);
                queue.push_back(*dependent);
            }
        }
        if reachable {
            memo.insert(id, true);
        } else {
            for node in visited {
                memo.insert(node, false);
            }
        }
        reachable
    }

    /// Remove `id` if nothing requires it to stay. Its dependencies are
    /// reattached to its dependents, then the affected dependents are
    /// compacted and external dependencies left without users are dropped.
    pub(crate) fn try_remove_node(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        if node.pins > 0 || node.auto_validated > 0 || node.is_validating() {
            return false;
        }
        match &node.kind {
            NodeKind::External => return false,
            NodeKind::State(_) if node.has_edges() => return false,
            _ => {}
        }
        if !node.dependencies(EdgeType::Write).is_empty()
            || !node.dependents(EdgeType::Write).is_empty()
        {
            return false;
        }
        if node
            .dependents(EdgeType::Read)
            .iter()
            .any(|r| self.nodes[*r].is_validating())
        {
            return false;
        }

        let mut former_dependents = Vec::new();
        let mut former_dependencies = Vec::new();
        for ty in EdgeType::ALL {
            let dependencies: Vec<NodeId> = self.dependencies(id, ty).iter().copied().collect();
            let dependents: Vec<NodeId> = self.dependents(id, ty).iter().copied().collect();
            for dependent in &dependents {
                for dependency in &dependencies {
                    self.add_dependency(*dependent, *dependency, ty);
                }
            }
            for dependency in &dependencies {
                self.remove_dependency(id, *dependency, ty);
            }
            for dependent in &dependents {
                self.remove_dependency(*dependent, id, ty);
            }
            if ty == EdgeType::Read {
                former_dependents = dependents;
                former_dependencies = dependencies;
            }
        }

        let node = self.nodes.remove(id);
        self.index.remove(&node.key);
        self.slru.remove(&id);
        self.roots.shift_remove(&id);
        debug_assert!(!node.has_edges());

        for dependent in former_dependents {
            self.shrink_dependencies(dependent);
        }
        for dependency in former_dependencies {
            self.release_external(dependency);
        }
        true
    }

    /// Collapse READ dependencies on several members of one external group
    /// into a single dependency on the group.
    ///
    /// Trades precision for memory: a change to any member of the group now
    /// invalidates `id`, even members it never read.
    pub(crate) fn shrink_dependencies(&mut self, id: NodeId) {
        if !self.nodes.contains(id)
            || self.nodes[id].is_validating()
            || self.dependencies(id, EdgeType::Read).len() <= SHRINK_THRESHOLD
        {
            return;
        }
        let mut by_group: indexmap::IndexMap<StateKey, Vec<NodeId>, ahash::RandomState> =
            Default::default();
        for dependency in self.dependencies(id, EdgeType::Read) {
            let node = &self.nodes[*dependency];
            if !node.is_external() {
                continue;
            }
            if let Some(group) = node.key.group() {
                by_group.entry(group).or_default().push(*dependency);
            }
        }
        for (group, members) in by_group {
            if members.len() < 2 {
                continue;
            }
            let group_id = self.get_or_add_node(&group);
            self.add_dependency(id, group_id, EdgeType::Read);
            for member in members {
                self.remove_dependency(id, member, EdgeType::Read);
                self.release_external(member);
            }
        }
    }

    /// Drop an external node that only its own group still points at, then
    /// walk up the group chain doing the same.
    pub(crate) fn release_external(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(id) = current.take() {
            let Some(node) = self.nodes.get(id) else {
                return;
            };
            if !node.is_external()
                || !node.dependencies(EdgeType::Read).is_empty()
                || !node.dependents(EdgeType::Write).is_empty()
                || node
                    .dependents(EdgeType::Read)
                    .iter()
                    .any(|d| !self.nodes[*d].is_external())
            {
                return;
            }
            let parents: Vec<NodeId> = node.dependents(EdgeType::Read).iter().copied().collect();
            for parent in &parents {
                self.remove_dependency(*parent, id, EdgeType::Read);
            }
            let node = self.nodes.remove(id);
            self.index.remove(&node.key);
            current = parents.first().copied();
        }
    }

    /// Record that `reader` read `target`.
    ///
    /// The edge is added right away so it exists even if `target` is evicted
    /// before `reader` commits.
    pub(crate) fn record_read(&mut self, reader: NodeId, target: NodeId) {
        self.add_dependency(reader, target, EdgeType::Read);
        if let Some(observed) = self.nodes[reader]
            .computation_mut()
            .and_then(|slot| slot.observed.as_mut())
        {
            observed.reads.insert(target);
        }
    }

    /// Store the contribution of `writer` to the state variable `target`.
    pub(crate) fn record_write(
        &mut self,
        writer: NodeId,
        target: NodeId,
        value: ErasedValue,
    ) -> Vec<Invalidated> {
        self.add_dependency(writer, target, EdgeType::Write);
        if let Some(observed) = self.nodes[writer]
            .computation_mut()
            .and_then(|slot| slot.observed.as_mut())
        {
            observed.writes.insert(target);
        }
        let node = &mut self.nodes[target];
        assert!(
            matches!(node.kind, NodeKind::State(_)),
            "write target {:?} is not a state variable",
            node.key
        );
        if let Some(slot) = node.state_slot_mut() {
            slot.writers.insert(writer, value);
        }
        self.state_changed(target)
    }

    /// Cached output of a state variable, or what is needed to reduce it.
    pub(crate) fn state_output(&mut self, id: NodeId) -> StateOutput {
        let node = &mut self.nodes[id];
        let Some(decl) = node.key.as_variable().cloned() else {
            panic!("{:?} is not a state variable", node.key);
        };
        let Some(slot) = node.state_slot_mut() else {
            panic!("state variable node without a state slot");
        };
        match &slot.output {
            Some(output) => StateOutput::Cached(output.clone()),
            None => StateOutput::Reduce {
                decl,
                inputs: slot.writers.values().cloned().collect(),
            },
        }
    }

    pub(crate) fn store_state_output(&mut self, id: NodeId, output: ErasedValue) {
        if let Some(slot) = self.nodes[id].state_slot_mut() {
            slot.output = Some(output);
        }
    }

    /// Mark `id` as validating and pin it until `restore` or `commit`.
    pub(crate) fn begin_validation(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        node.pins += 1;
        if let Some(slot) = node.computation_mut() {
            slot.state = CacheState::Validating;
        }
    }

    /// Start recording the dependencies of a body run.
    pub(crate) fn begin_run(&mut self, id: NodeId) {
        if let Some(slot) = self.nodes[id].computation_mut() {
            slot.observed = Some(Observed::default());
            slot.changed_while_running = false;
        }
    }

    /// Finish a validation that confirmed the previous result.
    pub(crate) fn restore(&mut self, id: NodeId) -> Option<Result<ErasedValue, EngineError>> {
        let revision = self.revision;
        let node = &mut self.nodes[id];
        node.pins = node.pins.saturating_sub(1);
        let slot = node.computation_mut()?;
        slot.state = match &slot.result {
            Some(Ok(_)) => CacheState::Valid,
            Some(Err(_)) => CacheState::Failed,
            None => CacheState::Invalid,
        };
        slot.validated_at = revision;
        let result = slot.result.clone();
        self.refresh_stale(id);
        result
    }

    /// Store the outcome of a body run and replace the node's edges with the
    /// ones the run observed.
    ///
    /// Writers that stopped writing a variable lose their contribution, which
    /// invalidates the variable's readers.
    pub(crate) fn commit(
        &mut self,
        id: NodeId,
        result: Result<ErasedValue, EngineError>,
        changed: bool,
    ) -> Vec<Invalidated> {
        let observed = self.nodes[id]
            .computation_mut()
            .and_then(|slot| slot.observed.take())
            .unwrap_or_default();
        let dropped_reads = self.set_dependencies(id, &observed.reads, EdgeType::Read);
        let dropped_writes = self.set_dependencies(id, &observed.writes, EdgeType::Write);

        let mut invalidated = Vec::new();
        for target in dropped_writes {
            let removed = self.nodes[target]
                .state_slot_mut()
                .and_then(|slot| slot.writers.shift_remove(&id))
                .is_some();
            if removed {
                invalidated.extend(self.state_changed(target));
            }
        }

        let revision = if changed {
            self.bump_revision()
        } else {
            self.revision
        };
        let node = &mut self.nodes[id];
        node.pins = node.pins.saturating_sub(1);
        if changed {
            node.changed_at = revision;
        }
        if let Some(slot) = node.computation_mut() {
            let settled = if result.is_ok() {
                CacheState::Valid
            } else {
                CacheState::Failed
            };
            slot.result = Some(result);
            slot.validated_at = revision;
            slot.state = if std::mem::take(&mut slot.changed_while_running) {
                CacheState::Invalid
            } else {
                settled
            };
        }
        self.refresh_stale(id);

        for dependency in dropped_reads {
            self.release_external(dependency);
        }
        invalidated
    }

    /// Undo `begin_validation` after the body panicked.
    pub(crate) fn abort_validation(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.pins = node.pins.saturating_sub(1);
        node.stale = true;
        if let Some(slot) = node.computation_mut() {
            slot.state = CacheState::Invalid;
            slot.observed = None;
            slot.changed_while_running = false;
        }
    }

    /// Verify that every edge is recorded on both ends.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (id, node) in &self.nodes {
            assert_eq!(self.index.get(&node.key), Some(&id));
            for ty in EdgeType::ALL {
                for to in node.dependencies(ty) {
                    assert!(self.nodes[*to].dependents(ty).contains(&id));
                }
                for from in node.dependents(ty) {
                    assert!(self.nodes[*from].dependencies(ty).contains(&id));
                }
            }
        }
        assert_eq!(self.index.len(), self.nodes.len());
    }
}
