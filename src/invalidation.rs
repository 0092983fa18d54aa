//! Invalidation flood.
//!
//! A change marks the computations that read the changed node directly as
//! `Invalid` and everything further up as `DependencyInvalid`. Every node on
//! the way gets the `stale` flag. The flood stops at nodes that are already
//! stale: their dependents were flagged when they were.

use std::collections::{HashSet, VecDeque};

use crate::node::{CacheState, EdgeType, NodeId, NodeKind};
use crate::graph::Graph;
use crate::StateKey;

/// A computation that left a settled state because of a change.
#[derive(Debug, Clone)]
pub(crate) struct Invalidated {
    pub id: NodeId,
    pub key: StateKey,
    pub state: CacheState,
    pub auto_validated: bool,
}

impl Graph {
    /// Apply a modification of external state.
    ///
    /// When the exact reference has no node, the nearest materialized group
    /// ancestor stands in for it.
    pub(crate) fn external_modified(&mut self, key: &StateKey) -> Vec<Invalidated> {
        let mut current = Some(key.clone());
        let origin = loop {
            match current {
                None => return Vec::new(),
                Some(key) => {
                    if let Some(id) = self.lookup(&key) {
                        break id;
                    }
                    current = key.group();
                }
            }
        };
        let revision = self.bump_revision();
        self.node_mut(origin).changed_at = revision;
        self.flood(origin, revision)
    }

    /// A state variable's contributions changed.
    pub(crate) fn state_changed(&mut self, id: NodeId) -> Vec<Invalidated> {
        let revision = self.bump_revision();
        let node = self.node_mut(id);
        node.changed_at = revision;
        if let Some(slot) = node.state_slot_mut() {
            slot.output = None;
        }
        self.flood(id, revision)
    }

    fn flood(&mut self, origin: NodeId, revision: u64) -> Vec<Invalidated> {
        let mut invalidated = Vec::new();
        let mut queue: VecDeque<(NodeId, bool, NodeId)> = self
            .dependents(origin, EdgeType::Read)
            .iter()
            .map(|dependent| (*dependent, true, origin))
            .collect();
        let mut visited_external = HashSet::new();

        while let Some((id, direct, from)) = queue.pop_front() {
            let node = self.node_mut(id);
            match &mut node.kind {
                NodeKind::External => {
                    if !visited_external.insert(id) {
                        continue;
                    }
                    node.changed_at = revision;
                    // Group chains pass the change through unchanged.
                    queue.extend(
                        node.dependents(EdgeType::Read)
                            .iter()
                            .map(|dependent| (*dependent, direct, id)),
                    );
                }
                NodeKind::State(_) => {
                    if node.stale {
                        continue;
                    }
                    node.stale = true;
                    queue.extend(
                        node.dependents(EdgeType::Read)
                            .iter()
                            .map(|dependent| (*dependent, false, id)),
                    );
                }
                NodeKind::Computation(slot) => {
                    match slot.state {
                        CacheState::Validating => {
                            if let Some(observed) = &slot.observed {
                                if observed.reads.contains(&from) {
                                    slot.changed_while_running = true;
                                }
                            }
                            continue;
                        }
                        CacheState::Valid | CacheState::Failed => {
                            slot.state = if direct {
                                CacheState::Invalid
                            } else {
                                CacheState::DependencyInvalid
                            };
                            invalidated.push(Invalidated {
                                id,
                                key: node.key.clone(),
                                state: slot.state,
                                auto_validated: node.auto_validated > 0,
                            });
                        }
                        CacheState::DependencyInvalid if direct => {
                            slot.state = CacheState::Invalid;
                        }
                        CacheState::New | CacheState::Invalid | CacheState::DependencyInvalid => {}
                    }
                    if node.stale {
                        continue;
                    }
                    node.stale = true;
                    queue.extend(
                        node.dependents(EdgeType::Read)
                            .iter()
                            .map(|dependent| (*dependent, false, id)),
                    );
                    // Pending writers make the variables they write stale.
                    queue.extend(
                        node.dependencies(EdgeType::Write)
                            .iter()
                            .map(|target| (*target, false, id)),
                    );
                }
            }
        }
        invalidated
    }

    /// Clear the stale flag of `id` once nothing beneath it is stale.
    ///
    /// Computations look at what they read; state variables at their writers.
    pub(crate) fn refresh_stale(&mut self, id: NodeId) {
        let node = self.node(id);
        let stale = match &node.kind {
            NodeKind::External => false,
            NodeKind::Computation(slot) => {
                slot.state.is_invalid()
                    || node
                        .dependencies(EdgeType::Read)
                        .iter()
                        .any(|dependency| self.node(*dependency).stale)
            }
            NodeKind::State(_) => node.dependents(EdgeType::Write).iter().any(|writer| {
                let writer = self.node(*writer);
                writer.stale || writer.cache_state().is_some_and(|s| s.is_invalid())
            }),
        };
        self.node_mut(id).stale = stale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ComputationSlot, Observed};
    use crate::{EngineConfig, EngineId, ExternalRef, StateGroup};

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Doc(u32);

    impl StateGroup for Doc {}

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Para(u32, u32);

    impl StateGroup for Para {
        fn group(&self) -> Option<ExternalRef> {
            Some(ExternalRef::new(Doc(self.0)))
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Render(u32);

    impl crate::Computation for Render {
        type Output = ();

        fn compute(
            &self,
            _ctx: &mut crate::EvalContext<'_, ()>,
        ) -> Result<(), crate::EngineError> {
            Ok(())
        }
    }

    fn settled(graph: &mut Graph, n: u32) -> NodeId {
        let id = graph.get_or_add_node(&StateKey::computation(EngineId::next(), Render(n)));
        let slot: &mut ComputationSlot = graph.node_mut(id).computation_mut().unwrap();
        slot.state = CacheState::Valid;
        id
    }

    fn state(graph: &Graph, id: NodeId) -> CacheState {
        graph.node(id).cache_state().unwrap()
    }

    #[test]
    fn test_direct_and_transitive_states() {
        let mut graph = Graph::new(&EngineConfig::default());
        let para = graph.get_or_add_node(&StateKey::external(Para(1, 1)));
        let inner = settled(&mut graph, 1);
        let outer = settled(&mut graph, 2);
        let unrelated = settled(&mut graph, 3);
        graph.add_dependency(inner, para, EdgeType::Read);
        graph.add_dependency(outer, inner, EdgeType::Read);

        let invalidated = graph.external_modified(&StateKey::external(Para(1, 1)));
        assert_eq!(invalidated.len(), 2);
        assert_eq!(state(&graph, inner), CacheState::Invalid);
        assert_eq!(state(&graph, outer), CacheState::DependencyInvalid);
        assert_eq!(state(&graph, unrelated), CacheState::Valid);
        assert!(graph.node(outer).stale);
        assert!(!graph.node(para).stale);
    }

    #[test]
    fn test_group_dependents_are_direct() {
        let mut graph = Graph::new(&EngineConfig::default());
        graph.get_or_add_node(&StateKey::external(Para(2, 5)));
        let doc = graph.lookup(&StateKey::external(Doc(2))).unwrap();
        let summary = settled(&mut graph, 1);
        graph.add_dependency(summary, doc, EdgeType::Read);

        graph.external_modified(&StateKey::external(Para(2, 5)));
        assert_eq!(state(&graph, summary), CacheState::Invalid);
    }

    #[test]
    fn test_missing_member_uses_group() {
        let mut graph = Graph::new(&EngineConfig::default());
        let doc = graph.get_or_add_node(&StateKey::external(Doc(4)));
        let summary = settled(&mut graph, 1);
        graph.add_dependency(summary, doc, EdgeType::Read);

        let invalidated = graph.external_modified(&StateKey::external(Para(4, 99)));
        assert_eq!(invalidated.len(), 1);
        assert_eq!(state(&graph, summary), CacheState::Invalid);
        assert!(graph.external_modified(&StateKey::external(Para(5, 0))).is_empty());
    }

    #[test]
    fn test_flood_stops_at_stale_nodes() {
        let mut graph = Graph::new(&EngineConfig::default());
        let para = graph.get_or_add_node(&StateKey::external(Para(1, 1)));
        let inner = settled(&mut graph, 1);
        let outer = settled(&mut graph, 2);
        graph.add_dependency(inner, para, EdgeType::Read);
        graph.add_dependency(outer, inner, EdgeType::Read);

        assert_eq!(graph.external_modified(&StateKey::external(Para(1, 1))).len(), 2);
        assert!(graph.external_modified(&StateKey::external(Para(1, 1))).is_empty());
    }

    #[test]
    fn test_running_body_marked_only_if_it_saw_the_change() {
        let mut graph = Graph::new(&EngineConfig::default());
        let seen = graph.get_or_add_node(&StateKey::external(Para(1, 1)));
        let unseen = graph.get_or_add_node(&StateKey::external(Para(1, 2)));
        let running = settled(&mut graph, 1);
        graph.add_dependency(running, seen, EdgeType::Read);
        graph.add_dependency(running, unseen, EdgeType::Read);
        {
            let slot = graph.node_mut(running).computation_mut().unwrap();
            slot.state = CacheState::Validating;
            let mut observed = Observed::default();
            observed.reads.insert(seen);
            slot.observed = Some(observed);
        }

        graph.external_modified(&StateKey::external(Para(1, 2)));
        assert!(!graph.node(running).computation().unwrap().changed_while_running);
        graph.external_modified(&StateKey::external(Para(1, 1)));
        assert!(graph.node(running).computation().unwrap().changed_while_running);
        assert_eq!(state(&graph, running), CacheState::Validating);
    }

    #[test]
    fn test_refresh_stale_bottom_up() {
        let mut graph = Graph::new(&EngineConfig::default());
        let para = graph.get_or_add_node(&StateKey::external(Para(1, 1)));
        let inner = settled(&mut graph, 1);
        let outer = settled(&mut graph, 2);
        graph.add_dependency(inner, para, EdgeType::Read);
        graph.add_dependency(outer, inner, EdgeType::Read);
        graph.external_modified(&StateKey::external(Para(1, 1)));

        graph.node_mut(outer).computation_mut().unwrap().state = CacheState::Valid;
        graph.refresh_stale(outer);
        assert!(graph.node(outer).stale, "inner is still stale");

        graph.node_mut(inner).computation_mut().unwrap().state = CacheState::Valid;
        graph.refresh_stale(inner);
        graph.refresh_stale(outer);
        assert!(!graph.node(inner).stale);
        assert!(!graph.node(outer).stale);
    }
}
