//! The incremental engine.
//!
//! All graph work happens inside one reentrant critical section. A read
//! resolves the node, returns the cached result when nothing beneath it
//! changed, and otherwise verifies its dependencies or runs its body. Bodies
//! run with the section held, so nested reads on the same thread re-enter it
//! and every other thread waits.
//!
//! External modifications arrive through the engine's [`DependencyListener`]
//! on an unbounded queue and are applied at the start of the next top-level
//! read, `flush` or background validation, never while a body is running.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, ReentrantMutex};

use crate::context::RawContext;
use crate::declaration::{downcast_value, ErasedComputation, ErasedValue};
use crate::graph::{Graph, StateOutput};
use crate::invalidation::Invalidated;
use crate::node::{CacheState, EdgeType, NodeId, NodeKind};
use crate::tracer::{NoopTracer, Tracer, ValidationOutcome};
use crate::tracking::{DependencyListener, DependencyTracker, ListenerId};
use crate::worker::{Worker, WorkerMessage};
use crate::{
    Computation, EngineBuilder, EngineConfig, EngineError, EngineId, StateKey, StateVariable,
};

/// `flush` gives up after this many passes over the auto-validated nodes.
const MAX_FLUSH_PASSES: usize = 64;

struct EngineState {
    graph: Graph,
    /// Nodes validating on the thread that holds the lock, outermost first.
    stack: Vec<NodeId>,
}

pub(crate) struct EngineInner {
    id: EngineId,
    this: Weak<EngineInner>,
    state: ReentrantMutex<RefCell<EngineState>>,
    worker: Worker,
    config: EngineConfig,
    tracker: DependencyTracker,
    listener: Mutex<Option<ListenerId>>,
    modifications: Receiver<StateKey>,
    tracer: Arc<dyn Tracer>,
    disposed: AtomicBool,
}

/// Bridge from the tracker to one engine.
struct EngineListener {
    engine: Weak<EngineInner>,
    modifications: Sender<StateKey>,
}

impl DependencyListener for EngineListener {
    fn accessed(&self, key: &StateKey) {
        if !key.is_external() {
            return;
        }
        if let Some(engine) = self.engine.upgrade() {
            engine.record_access(key);
        }
    }

    fn modified(&self, key: &StateKey) {
        if !key.is_external() || self.modifications.send(key.clone()).is_err() {
            return;
        }
        if let Some(engine) = self.engine.upgrade() {
            if engine.worker.is_started() {
                engine.worker.send(WorkerMessage::Drain);
            }
        }
    }
}

impl EngineInner {
    fn new(config: EngineConfig, tracker: DependencyTracker, tracer: Arc<dyn Tracer>) -> Arc<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let inner = Arc::new_cyclic(|this| EngineInner {
            id: EngineId::next(),
            this: this.clone(),
            state: ReentrantMutex::new(RefCell::new(EngineState {
                graph: Graph::new(&config),
                stack: Vec::new(),
            })),
            worker: Worker::new(config.queue_capacity),
            config,
            tracker: tracker.clone(),
            listener: Mutex::new(None),
            modifications: receiver,
            tracer,
            disposed: AtomicBool::new(false),
        });
        let listener = tracker.register(Arc::new(EngineListener {
            engine: Arc::downgrade(&inner),
            modifications: sender,
        }));
        *inner.listener.lock() = Some(listener);
        tracing::debug!(engine = ?inner.id, "engine created");
        inner
    }

    pub(crate) fn id(&self) -> EngineId {
        self.id
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Resolve `key` and bring it up to date. `reader` is the running
    /// computation the read belongs to; without one, a read made from inside
    /// a body on the thread running it belongs to that body.
    pub(crate) fn read_key(
        &self,
        key: &StateKey,
        reader: Option<NodeId>,
    ) -> Result<ErasedValue, EngineError> {
        if self.is_disposed() {
            return Err(EngineError::Disposed);
        }
        let guard = self.state.lock();
        let state: &RefCell<EngineState> = &guard;
        let top_level = state.borrow().stack.is_empty();
        if top_level {
            self.drain_modifications(state);
        }
        let reader = reader.or_else(|| state.borrow().stack.last().copied());
        let (id, is_variable) = {
            let mut st = state.borrow_mut();
            let id = st.graph.access(key);
            self.evict(&mut st.graph);
            let node = st.graph.node(id);
            match node.kind {
                NodeKind::Computation(_) => (id, false),
                NodeKind::State(_) => (id, true),
                NodeKind::External => {
                    panic!("external state {:?} is read through its provider", key)
                }
            }
        };
        let result = if is_variable {
            Ok(self.read_state_node(state, id, reader))
        } else {
            self.update(state, id, reader)
        };
        if top_level {
            self.evict_deferred(state);
        }
        result
    }

    /// Store a contribution of the running computation `writer`.
    pub(crate) fn write_key(&self, writer: NodeId, key: &StateKey, value: ErasedValue) {
        if self.is_disposed() {
            tracing::debug!(key = ?key, "write to a disposed engine ignored");
            return;
        }
        let guard = self.state.lock();
        let invalidated = {
            let mut st = guard.borrow_mut();
            let target = st.graph.access(key);
            self.evict(&mut st.graph);
            st.graph.record_write(writer, target, value)
        };
        self.after_invalidation(invalidated);
    }

    /// Turn a tracker read into an edge of the computation running on this
    /// thread. Reads from threads that do not hold the lock are ignored.
    fn record_access(&self, key: &StateKey) {
        let Some(guard) = self.state.try_lock() else {
            return;
        };
        let Ok(mut st) = guard.try_borrow_mut() else {
            return;
        };
        let Some(&reader) = st.stack.last() else {
            return;
        };
        let target = st.graph.get_or_add_node(key);
        st.graph.record_read(reader, target);
    }

    fn update(
        &self,
        state: &RefCell<EngineState>,
        id: NodeId,
        reader: Option<NodeId>,
    ) -> Result<ErasedValue, EngineError> {
        let (key, decl, verify, previous) = {
            let mut st = state.borrow_mut();
            if let Some(pos) = st.stack.iter().position(|frame| *frame == id) {
                let path: Vec<String> = st.stack[pos..]
                    .iter()
                    .map(|frame| st.graph.node(*frame).key.debug_repr())
                    .collect();
                drop(st);
                tracing::debug!(?path, "dependency cycle");
                self.tracer.on_cycle_detected(&path);
                return Err(EngineError::Cycle { path });
            }
            if let Some(reader) = reader {
                st.graph.record_read(reader, id);
            }

            let node = st.graph.node(id);
            let Some(slot) = node.computation() else {
                panic!("{:?} is not a computation", node.key);
            };
            if !node.stale && slot.state.is_settled() {
                if let Some(result) = &slot.result {
                    return result.clone();
                }
            }
            debug_assert!(slot.state != CacheState::Validating);
            let Some(decl) = node.key.as_computation().cloned() else {
                panic!("{:?} is not a computation", node.key);
            };
            let verify = slot.result.is_some() && slot.state != CacheState::Invalid;
            let previous = match &slot.result {
                Some(Ok(value)) => Some(value.clone()),
                _ => None,
            };
            let key = node.key.clone();

            st.graph.begin_validation(id);
            st.stack.push(id);
            (key, decl, verify, previous)
        };

        match catch_unwind(AssertUnwindSafe(|| {
            self.validate(state, id, &key, decl, verify, previous)
        })) {
            Ok(result) => result,
            Err(payload) => {
                let mut st = state.borrow_mut();
                st.graph.abort_validation(id);
                if let Some(pos) = st.stack.iter().position(|frame| *frame == id) {
                    st.stack.truncate(pos);
                }
                drop(st);
                tracing::error!(key = ?key, "computation panicked");
                resume_unwind(payload)
            }
        }
    }

    fn validate(
        &self,
        state: &RefCell<EngineState>,
        id: NodeId,
        key: &StateKey,
        decl: Arc<dyn ErasedComputation>,
        verify: bool,
        previous: Option<ErasedValue>,
    ) -> Result<ErasedValue, EngineError> {
        if verify && self.dependencies_unchanged(state, id) {
            let restored = {
                let mut st = state.borrow_mut();
                let popped = st.stack.pop();
                debug_assert_eq!(popped, Some(id));
                st.graph.restore(id)
            };
            tracing::trace!(key = ?key, "dependencies unchanged");
            self.tracer.on_validation_end(key, &ValidationOutcome::Verified);
            return match restored {
                Some(result) => result,
                None => unreachable!("verified nodes hold a result"),
            };
        }

        state.borrow_mut().graph.begin_run(id);
        tracing::trace!(key = ?key, "running");
        self.tracer.on_validation_start(key);

        let result = decl.compute_erased(RawContext {
            engine: self,
            node: id,
            previous: previous.clone(),
        });
        let changed = match (&previous, &result) {
            (Some(old), Ok(new)) => !decl.output_eq_erased(old, new),
            _ => true,
        };

        let (invalidated, requeue) = {
            let mut st = state.borrow_mut();
            let popped = st.stack.pop();
            debug_assert_eq!(popped, Some(id));
            let invalidated = st.graph.commit(id, result.clone(), changed);
            let node = st.graph.node(id);
            let requeue =
                node.auto_validated > 0 && node.cache_state() == Some(CacheState::Invalid);
            (invalidated, requeue)
        };
        self.after_invalidation(invalidated);
        if requeue {
            self.schedule(id);
        }

        let outcome = match &result {
            Err(err) => ValidationOutcome::Failed {
                message: err.to_string(),
            },
            Ok(_) if changed => ValidationOutcome::Changed,
            Ok(_) => ValidationOutcome::Unchanged,
        };
        tracing::trace!(key = ?key, ?outcome, "validated");
        self.tracer.on_validation_end(key, &outcome);
        result
    }

    /// Bring every READ dependency of `id` up to date and report whether
    /// none of them changed since `id` was last validated.
    fn dependencies_unchanged(&self, state: &RefCell<EngineState>, id: NodeId) -> bool {
        let (validated_at, dependencies) = {
            let st = state.borrow();
            let node = st.graph.node(id);
            let validated_at = node.computation().map_or(0, |slot| slot.validated_at);
            let dependencies: Vec<StateKey> = node
                .dependencies(EdgeType::Read)
                .iter()
                .map(|dependency| st.graph.node(*dependency).key.clone())
                .collect();
            (validated_at, dependencies)
        };

        for key in dependencies {
            let found = state.borrow().graph.lookup(&key);
            let Some(dependency) = found else {
                return false;
            };
            let (is_variable, needs_update) = {
                let st = state.borrow();
                let node = st.graph.node(dependency);
                (matches!(node.kind, NodeKind::State(_)), node.needs_update())
            };
            if is_variable {
                self.settle_writers(state, dependency);
                state.borrow_mut().graph.refresh_stale(dependency);
            } else if needs_update {
                // A failure is a change like any other; the revision says so.
                let _ = self.update(state, dependency, None);
            }
            let st = state.borrow();
            if !st.graph.contains(dependency) || st.graph.node(dependency).changed_at > validated_at
            {
                return false;
            }
        }
        true
    }

    /// Validate the writers of a state variable that are out of date, so a
    /// read sees every contribution of the current revision.
    fn settle_writers(&self, state: &RefCell<EngineState>, id: NodeId) {
        let writers: Vec<NodeId> = {
            let st = state.borrow();
            st.graph
                .dependents(id, EdgeType::Write)
                .iter()
                .copied()
                .filter(|writer| !st.stack.contains(writer))
                .collect()
        };
        for writer in writers {
            let pending = {
                let st = state.borrow();
                st.graph.contains(writer)
                    && st.graph.dependents(id, EdgeType::Write).contains(&writer)
                    && st.graph.node(writer).needs_update()
            };
            if !pending {
                continue;
            }
            if let Err(err) = self.update(state, writer, None) {
                tracing::debug!(error = %err, "pending writer failed");
            }
        }
    }

    fn read_state_node(
        &self,
        state: &RefCell<EngineState>,
        id: NodeId,
        reader: Option<NodeId>,
    ) -> ErasedValue {
        state.borrow_mut().graph.node_mut(id).pins += 1;
        self.settle_writers(state, id);
        let output = {
            let mut st = state.borrow_mut();
            st.graph.node_mut(id).pins -= 1;
            st.graph.refresh_stale(id);
            // After the writers ran, so their writes do not count as changes
            // seen by the reader.
            if let Some(reader) = reader {
                st.graph.record_read(reader, id);
            }
            st.graph.state_output(id)
        };
        match output {
            StateOutput::Cached(value) => value,
            StateOutput::Reduce { decl, inputs } => {
                let value = if inputs.is_empty() {
                    decl.default_erased()
                } else {
                    let inputs: Vec<&ErasedValue> = inputs.iter().collect();
                    decl.reduce_erased(&inputs)
                };
                state.borrow_mut().graph.store_state_output(id, value.clone());
                value
            }
        }
    }

    fn drain_modifications(&self, state: &RefCell<EngineState>) {
        let keys: Vec<StateKey> = self.modifications.try_iter().collect();
        if keys.is_empty() {
            return;
        }
        let mut invalidated = Vec::new();
        {
            let mut st = state.borrow_mut();
            for key in &keys {
                invalidated.extend(st.graph.external_modified(key));
            }
        }
        tracing::trace!(
            modifications = keys.len(),
            invalidated = invalidated.len(),
            "applied external modifications"
        );
        self.after_invalidation(invalidated);
    }

    fn after_invalidation(&self, invalidated: Vec<Invalidated>) {
        for entry in invalidated {
            self.tracer.on_invalidated(&entry.key, entry.state);
            if entry.auto_validated {
                self.schedule(entry.id);
            }
        }
    }

    fn schedule(&self, id: NodeId) {
        if self.worker.is_started() {
            self.worker.send(WorkerMessage::Validate(id));
        }
    }

    /// Remove the nodes that fell out of the SLRU. Nodes that cannot go yet
    /// are retried once the outermost validation is done.
    fn evict(&self, graph: &mut Graph) {
        for id in graph.take_pending_evictions() {
            if graph.contains(id) && !self.try_evict(graph, id) {
                graph.defer_eviction(id);
            }
        }
    }

    /// Retry deferred evictions. Only called with an empty frame stack, so
    /// nothing is validating; what is still refused (roots, writers, state
    /// variables with edges) re-enters the SLRU on its next access.
    fn evict_deferred(&self, state: &RefCell<EngineState>) {
        let mut st = state.borrow_mut();
        debug_assert!(st.stack.is_empty());
        let deferred = st.graph.take_deferred_evictions();
        if deferred.is_empty() {
            return;
        }
        let mut kept = 0usize;
        for id in deferred {
            if st.graph.contains(id) && !self.try_evict(&mut st.graph, id) {
                kept += 1;
            }
        }
        tracing::trace!(kept, "retried deferred evictions");
    }

    fn try_evict(&self, graph: &mut Graph, id: NodeId) -> bool {
        let key = graph.node(id).key.clone();
        let removed = graph.try_remove_node(id);
        if removed {
            tracing::debug!(key = ?key, "evicted");
            self.tracer.on_evicted(&key);
        }
        removed
    }

    /// Background validation of `target`, or of every pending root.
    pub(crate) fn auto_validate(&self, target: Option<NodeId>) {
        if self.is_disposed() {
            return;
        }
        let guard = self.state.lock();
        let state: &RefCell<EngineState> = &guard;
        if !state.borrow().stack.is_empty() {
            return;
        }
        self.drain_modifications(state);
        let pending: Vec<NodeId> = {
            let st = state.borrow();
            let candidates = match target {
                Some(id) => vec![id],
                None => st.graph.pending_roots(),
            };
            let mut memo = HashMap::new();
            candidates
                .into_iter()
                .filter(|id| {
                    st.graph.contains(*id)
                        && st.graph.node(*id).needs_update()
                        && st.graph.is_reachable(*id, &mut memo)
                })
                .collect()
        };
        for id in pending {
            if let Err(err) = self.update(state, id, None) {
                tracing::debug!(error = %err, "auto-validation failed");
            }
        }
        self.evict_deferred(state);
    }

    fn flush(&self) -> Result<(), EngineError> {
        if self.is_disposed() {
            return Err(EngineError::Disposed);
        }
        let guard = self.state.lock();
        let state: &RefCell<EngineState> = &guard;
        if !state.borrow().stack.is_empty() {
            tracing::debug!("flush inside a running computation ignored");
            return Ok(());
        }
        for pass in 0..MAX_FLUSH_PASSES {
            self.drain_modifications(state);
            let pending = state.borrow().graph.pending_roots();
            if pending.is_empty() {
                self.evict_deferred(state);
                return Ok(());
            }
            tracing::trace!(pass, pending = pending.len(), "flush pass");
            for id in pending {
                if let Err(err) = self.update(state, id, None) {
                    tracing::debug!(error = %err, "auto-validated computation failed");
                }
            }
        }
        tracing::warn!(passes = MAX_FLUSH_PASSES, "flush did not converge");
        self.evict_deferred(state);
        Ok(())
    }

    fn activate(&self, key: &StateKey) -> Result<NodeId, EngineError> {
        if self.is_disposed() {
            return Err(EngineError::Disposed);
        }
        let id = {
            let guard = self.state.lock();
            let mut st = guard.borrow_mut();
            let id = st.graph.access(key);
            self.evict(&mut st.graph);
            st.graph.acquire_root(id);
            id
        };
        self.worker.ensure_started(self.this.clone());
        self.worker.send(WorkerMessage::Validate(id));
        Ok(id)
    }

    fn deactivate(&self, id: NodeId) {
        let guard = self.state.lock();
        let state: &RefCell<EngineState> = &guard;
        state.borrow_mut().graph.release_root(id);
        if state.borrow().stack.is_empty() {
            self.evict_deferred(state);
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(listener) = self.listener.lock().take() {
            self.tracker.unregister(listener);
        }
        self.worker.stop();
        tracing::debug!(engine = ?self.id, "engine disposed");
    }

    fn cache_state(&self, key: &StateKey) -> Option<CacheState> {
        let guard = self.state.lock();
        let st = guard.borrow();
        st.graph
            .lookup(key)
            .and_then(|id| st.graph.node(id).cache_state())
    }

    fn node_count(&self) -> usize {
        self.state.lock().borrow().graph.len()
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            self.tracker.unregister(listener);
        }
        self.worker.stop();
    }
}

/// Incremental computation engine.
///
/// Caches the output of every [`Computation`] it evaluates together with the
/// state it read, and re-runs a body only when something it depends on
/// changed. This is cheap to clone; clones share the engine.
///
/// # Example
///
/// ```ignore
/// let engine = IncrementalEngine::new();
/// let prices = TrackedList::new(engine.tracker(), vec![3, 4, 5]);
///
/// let total = engine.read_state_variable(&Total(prices.clone()))?;
/// prices.set(0, 10);
/// let total = engine.read_state_variable(&Total(prices.clone()))?; // re-runs once
/// ```
#[derive(Clone)]
pub struct IncrementalEngine {
    inner: Arc<EngineInner>,
}

impl Default for IncrementalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementalEngine {
    /// Create an engine with the default configuration and its own tracker.
    pub fn new() -> Self {
        Self::from_parts(
            EngineConfig::default(),
            DependencyTracker::new(),
            Arc::new(NoopTracer),
        )
    }

    /// Start building an engine with custom configuration.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn from_parts(
        config: EngineConfig,
        tracker: DependencyTracker,
        tracer: Arc<dyn Tracer>,
    ) -> Self {
        Self {
            inner: EngineInner::new(config, tracker, tracer),
        }
    }

    /// Identity of this engine.
    pub fn id(&self) -> EngineId {
        self.inner.id
    }

    /// The tracker external state reports to.
    pub fn tracker(&self) -> &DependencyTracker {
        &self.inner.tracker
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Read a computation, running its body if the cached output is out of
    /// date.
    ///
    /// A stored failure is returned again until something the body read
    /// changes. Called from inside a body on the thread running it, the read
    /// becomes a dependency of that body like [`EvalContext::read`].
    ///
    /// [`EvalContext::read`]: crate::EvalContext::read
    pub fn read_state_variable<C: Computation>(
        &self,
        decl: &C,
    ) -> Result<Arc<C::Output>, EngineError> {
        let key = StateKey::computation(self.inner.id, decl.clone());
        self.inner
            .read_key(&key, None)
            .map(downcast_value::<C::Output>)
    }

    /// Read several computations in order. Stops at the first error.
    pub fn read_state_variables<C: Computation>(
        &self,
        decls: &[C],
    ) -> Result<Vec<Arc<C::Output>>, EngineError> {
        decls
            .iter()
            .map(|decl| self.read_state_variable(decl))
            .collect()
    }

    /// Read a state variable: the reduce over its current writers, or its
    /// default when nothing writes it.
    pub fn read_variable<V: StateVariable>(
        &self,
        var: &V,
    ) -> Result<Arc<V::Output>, EngineError> {
        let key = StateKey::variable(self.inner.id, var.clone());
        self.inner
            .read_key(&key, None)
            .map(downcast_value::<V::Output>)
    }

    /// Keep `decl` up to date in the background.
    ///
    /// The computation is validated by the engine's worker thread whenever it
    /// is invalidated, until the returned handle is deactivated. `flush`
    /// performs the same work synchronously.
    pub fn activate<C: Computation>(&self, decl: C) -> Result<ActiveOutput, EngineError> {
        let key = StateKey::computation(self.inner.id, decl);
        let node = self.inner.activate(&key)?;
        Ok(ActiveOutput {
            engine: Arc::downgrade(&self.inner),
            node,
            key,
            active: AtomicBool::new(true),
        })
    }

    /// Apply pending modifications and validate every activated computation
    /// that is out of date.
    pub fn flush(&self) -> Result<(), EngineError> {
        self.inner.flush()
    }

    /// Stop the engine.
    ///
    /// Unregisters from the tracker and stops the worker. Later reads,
    /// activations and flushes fail with [`EngineError::Disposed`]. Calling
    /// this again does nothing.
    pub fn dispose(&self) {
        self.inner.dispose()
    }

    /// Whether [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Cache state of a computation, `None` if it has no node.
    pub fn cache_state<C: Computation>(&self, decl: &C) -> Option<CacheState> {
        self.inner
            .cache_state(&StateKey::computation(self.inner.id, decl.clone()))
    }

    /// Number of nodes in the dependency graph, external ones included.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }
}

impl fmt::Debug for IncrementalEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncrementalEngine")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`IncrementalEngine::activate`].
///
/// Dropping the handle does not deactivate the computation.
pub struct ActiveOutput {
    engine: Weak<EngineInner>,
    node: NodeId,
    key: StateKey,
    active: AtomicBool,
}

impl ActiveOutput {
    /// Stop auto-validating the computation. Calling this again does nothing.
    pub fn deactivate(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(engine) = self.engine.upgrade() {
            engine.deactivate(self.node);
        }
    }

    /// Whether the handle still keeps its computation activated.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// The activated computation.
    pub fn key(&self) -> &StateKey {
        &self.key
    }
}

impl fmt::Debug for ActiveOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveOutput")
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}
