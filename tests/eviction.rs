//! Bounded-memory behaviour: evicting nodes must never change what readers
//! observe.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{init_tracing, Counter};
use stateflow::{
    Computation, EngineError, EvalContext, IncrementalEngine, StateKey, StateVariable, Tracer,
    TrackedList,
};

#[derive(Clone, Default)]
struct EvictionCounter(Arc<AtomicUsize>);

impl Tracer for EvictionCounter {
    fn on_evicted(&self, _key: &StateKey) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RangeSum {
    values: TrackedList<i64>,
    lo: usize,
    hi: usize,
    runs: Counter,
}

impl RangeSum {
    fn root(values: &TrackedList<i64>) -> Self {
        Self {
            values: values.clone(),
            lo: 0,
            hi: values.to_vec().len(),
            runs: Counter::new(),
        }
    }

    fn half(&self, lo: usize, hi: usize) -> Self {
        Self {
            values: self.values.clone(),
            lo,
            hi,
            runs: self.runs.clone(),
        }
    }
}

impl Computation for RangeSum {
    type Output = i64;

    fn compute(&self, ctx: &mut EvalContext<'_, i64>) -> Result<i64, EngineError> {
        self.runs.hit();
        if self.hi - self.lo == 1 {
            return Ok(self.values.get(self.lo).unwrap_or(0));
        }
        let mid = self.lo + (self.hi - self.lo) / 2;
        let left = ctx.read(&self.half(self.lo, mid))?;
        let right = ctx.read(&self.half(mid, self.hi))?;
        Ok(*left + *right)
    }
}

fn small_engine(max_size: usize, evictions: &EvictionCounter) -> IncrementalEngine {
    IncrementalEngine::builder()
        .max_size(max_size)
        .tracer(evictions.clone())
        .build()
        .unwrap()
}

fn eager(values: &TrackedList<i64>) -> i64 {
    values.to_vec().iter().sum()
}

#[test]
fn test_range_sum_survives_heavy_eviction() {
    init_tracing();
    let evictions = EvictionCounter::default();
    let engine = small_engine(32, &evictions);
    let values = TrackedList::new(engine.tracker(), (0..300).collect());
    let root = RangeSum::root(&values);

    assert_eq!(*engine.read_state_variable(&root).unwrap(), eager(&values));
    assert!(evictions.0.load(Ordering::SeqCst) > 0);
    // At most the budget of computations, plus the list and its elements.
    assert!(engine.node_count() <= 32 + 301);

    for (index, value) in [(3, 1_000), (150, -7), (299, 12), (3, 4)] {
        values.set(index, value);
        assert_eq!(*engine.read_state_variable(&root).unwrap(), eager(&values));
    }

    // Sub-ranges read directly agree with an engine that never evicts.
    let reference = IncrementalEngine::new();
    for (lo, hi) in [(0, 150), (150, 300), (75, 150), (3, 4)] {
        let range = root.half(lo, hi);
        assert_eq!(
            engine.read_state_variable(&range).unwrap(),
            reference.read_state_variable(&range).unwrap()
        );
    }
}

#[test]
fn test_budget_of_one_node_still_works() {
    let evictions = EvictionCounter::default();
    let engine = small_engine(1, &evictions);
    let values = TrackedList::new(engine.tracker(), (1..=40).collect());
    let root = RangeSum::root(&values);

    assert_eq!(*engine.read_state_variable(&root).unwrap(), 820);
    values.set(0, 101);
    assert_eq!(*engine.read_state_variable(&root).unwrap(), 920);
    values.set(39, 0);
    assert_eq!(*engine.read_state_variable(&root).unwrap(), 880);
}

#[test]
fn test_eviction_keeps_reruns_bounded_by_default() {
    let evictions = EvictionCounter::default();
    let engine = small_engine(100_000, &evictions);
    let values = TrackedList::new(engine.tracker(), (0..64).collect());
    let root = RangeSum::root(&values);

    engine.read_state_variable(&root).unwrap();
    assert_eq!(evictions.0.load(Ordering::SeqCst), 0);
    let before = root.runs.get();
    values.set(10, 0);
    engine.read_state_variable(&root).unwrap();
    assert_eq!(root.runs.get() - before, 7);
}

/// Sum of `lo..hi` without any external state, so every node counts
/// against the budget.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Tree {
    lo: i64,
    hi: i64,
}

impl Computation for Tree {
    type Output = i64;

    fn compute(&self, ctx: &mut EvalContext<'_, i64>) -> Result<i64, EngineError> {
        if self.hi - self.lo == 1 {
            return Ok(self.lo);
        }
        let mid = self.lo + (self.hi - self.lo) / 2;
        let left = ctx.read(&Tree { lo: self.lo, hi: mid })?;
        let right = ctx.read(&Tree { lo: mid, hi: self.hi })?;
        Ok(*left + *right)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Single(u32);

impl Computation for Single {
    type Output = u32;

    fn compute(&self, _ctx: &mut EvalContext<'_, u32>) -> Result<u32, EngineError> {
        Ok(self.0)
    }
}

#[test]
fn test_node_count_returns_to_budget_after_deep_read() {
    let evictions = EvictionCounter::default();
    let engine = small_engine(32, &evictions);
    let root = Tree { lo: 0, hi: 2000 };

    assert_eq!(*engine.read_state_variable(&root).unwrap(), 1_999_000);
    assert!(engine.node_count() <= 32);

    for n in 0..200 {
        assert_eq!(*engine.read_state_variable(&Single(n)).unwrap(), n);
        assert!(engine.node_count() <= 32);
    }
    assert_eq!(*engine.read_state_variable(&root).unwrap(), 1_999_000);
    assert!(engine.node_count() <= 32);
}

// ============================================================================
// Writers under eviction
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Histogram;

impl StateVariable for Histogram {
    type Input = (usize, i64);
    type Output = Vec<(usize, i64)>;

    fn default_output(&self) -> Vec<(usize, i64)> {
        Vec::new()
    }

    fn reduce(&self, inputs: &[&(usize, i64)]) -> Vec<(usize, i64)> {
        let mut out: Vec<(usize, i64)> = inputs.iter().map(|input| **input).collect();
        out.sort();
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Bucket(TrackedList<i64>, usize);

impl Computation for Bucket {
    type Output = ();

    fn compute(&self, ctx: &mut EvalContext<'_, ()>) -> Result<(), EngineError> {
        if let Some(value) = self.0.get(self.1) {
            ctx.write(&Histogram, (self.1, value));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Collect(TrackedList<i64>);

impl Computation for Collect {
    type Output = Vec<(usize, i64)>;

    fn compute(
        &self,
        ctx: &mut EvalContext<'_, Vec<(usize, i64)>>,
    ) -> Result<Vec<(usize, i64)>, EngineError> {
        for index in 0..8 {
            ctx.read(&Bucket(self.0.clone(), index))?;
        }
        Ok((*ctx.read_variable(&Histogram)?).clone())
    }
}

#[test]
fn test_writers_are_never_evicted() {
    let evictions = EvictionCounter::default();
    let engine = small_engine(2, &evictions);
    let values = TrackedList::new(engine.tracker(), (0..8).map(|i| i * 10).collect());
    let collect = Collect(values.clone());

    let expected: Vec<(usize, i64)> = (0..8).map(|i| (i, i as i64 * 10)).collect();
    assert_eq!(*engine.read_state_variable(&collect).unwrap(), expected);

    values.set(4, -1);
    let mut expected = expected;
    expected[4] = (4, -1);
    assert_eq!(*engine.read_state_variable(&collect).unwrap(), expected);
    assert_eq!(*engine.read_variable(&Histogram).unwrap(), expected);
}
