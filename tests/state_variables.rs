//! State variables written by several computations.

mod common;

use common::{Counter, EngineHandle};
use stateflow::{
    Computation, EngineError, EvalContext, IncrementalEngine, StateVariable, TrackedValue,
};

/// Sum of all contributions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Total(u32);

impl StateVariable for Total {
    type Input = i64;
    type Output = i64;

    fn default_output(&self) -> i64 {
        0
    }

    fn reduce(&self, inputs: &[&i64]) -> i64 {
        inputs.iter().copied().sum()
    }
}

/// Contributions in writer order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Names;

impl StateVariable for Names {
    type Input = String;
    type Output = Vec<String>;

    fn default_output(&self) -> Vec<String> {
        Vec::new()
    }

    fn reduce(&self, inputs: &[&String]) -> Vec<String> {
        inputs.iter().map(|name| name.to_string()).collect()
    }
}

/// Writes its source into `Total` while the source is `Some`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Contribute {
    target: u32,
    source: TrackedValue<Option<i64>>,
}

impl Computation for Contribute {
    type Output = ();

    fn compute(&self, ctx: &mut EvalContext<'_, ()>) -> Result<(), EngineError> {
        if let Some(value) = self.source.get() {
            ctx.write(&Total(self.target), value);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ReadTotal(u32, Counter);

impl Computation for ReadTotal {
    type Output = i64;

    fn compute(&self, ctx: &mut EvalContext<'_, i64>) -> Result<i64, EngineError> {
        self.1.hit();
        Ok(*ctx.read_variable(&Total(self.0))?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Announce(&'static str);

impl Computation for Announce {
    type Output = ();

    fn compute(&self, ctx: &mut EvalContext<'_, ()>) -> Result<(), EngineError> {
        ctx.write(&Names, self.0.to_string());
        Ok(())
    }
}

fn contributor(engine: &IncrementalEngine, target: u32, value: i64) -> Contribute {
    Contribute {
        target,
        source: TrackedValue::new(engine.tracker(), Some(value)),
    }
}

#[test]
fn test_unwritten_variable_reads_default() {
    let engine = IncrementalEngine::new();
    assert_eq!(*engine.read_variable(&Total(0)).unwrap(), 0);
    assert!(engine.read_variable(&Names).unwrap().is_empty());
}

#[test]
fn test_reduce_over_all_writers() {
    let engine = IncrementalEngine::new();
    let w1 = contributor(&engine, 1, 2);
    let w2 = contributor(&engine, 1, 3);
    engine.read_state_variable(&w1).unwrap();
    engine.read_state_variable(&w2).unwrap();

    assert_eq!(*engine.read_variable(&Total(1)).unwrap(), 5);
    let reader = ReadTotal(1, Counter::new());
    assert_eq!(*engine.read_state_variable(&reader).unwrap(), 5);
}

#[test]
fn test_reduce_keeps_first_write_order() {
    let engine = IncrementalEngine::new();
    engine.read_state_variable(&Announce("second")).unwrap();
    engine.read_state_variable(&Announce("first")).unwrap();
    assert_eq!(
        *engine.read_variable(&Names).unwrap(),
        vec!["second".to_string(), "first".to_string()]
    );
}

#[test]
fn test_pending_writer_runs_before_read() {
    let engine = IncrementalEngine::new();
    let w1 = contributor(&engine, 2, 2);
    let w2 = contributor(&engine, 2, 3);
    engine.read_state_variable(&w1).unwrap();
    engine.read_state_variable(&w2).unwrap();
    let reader = ReadTotal(2, Counter::new());
    assert_eq!(*engine.read_state_variable(&reader).unwrap(), 5);

    // Nobody reads w1 again; reading the total brings it up to date.
    w1.source.set(Some(10));
    assert_eq!(*engine.read_state_variable(&reader).unwrap(), 13);
    assert_eq!(*engine.read_variable(&Total(2)).unwrap(), 13);
    assert_eq!(reader.1.get(), 2);
}

#[test]
fn test_writer_that_stops_writing_is_withdrawn() {
    let engine = IncrementalEngine::new();
    let w1 = contributor(&engine, 3, 2);
    let w2 = contributor(&engine, 3, 3);
    engine.read_state_variable(&w1).unwrap();
    engine.read_state_variable(&w2).unwrap();
    let reader = ReadTotal(3, Counter::new());
    assert_eq!(*engine.read_state_variable(&reader).unwrap(), 5);

    w1.source.set(None);
    assert_eq!(*engine.read_state_variable(&reader).unwrap(), 3);
    assert_eq!(*engine.read_variable(&Total(3)).unwrap(), 3);
    assert_eq!(reader.1.get(), 2);

    w2.source.set(None);
    engine.read_state_variable(&w2).unwrap();
    assert_eq!(*engine.read_variable(&Total(3)).unwrap(), 0);
    assert_eq!(*engine.read_state_variable(&reader).unwrap(), 0);
}

#[test]
fn test_unrelated_writer_does_not_disturb_reader() {
    let engine = IncrementalEngine::new();
    let mine = contributor(&engine, 4, 1);
    let other = contributor(&engine, 5, 1);
    engine.read_state_variable(&mine).unwrap();
    engine.read_state_variable(&other).unwrap();
    let reader = ReadTotal(4, Counter::new());
    engine.read_state_variable(&reader).unwrap();

    other.source.set(Some(100));
    engine.read_state_variable(&other).unwrap();
    assert_eq!(*engine.read_state_variable(&reader).unwrap(), 1);
    assert_eq!(reader.1.get(), 1);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DisposeThenWrite(EngineHandle);

impl Computation for DisposeThenWrite {
    type Output = ();

    fn compute(&self, ctx: &mut EvalContext<'_, ()>) -> Result<(), EngineError> {
        self.0 .0.dispose();
        ctx.write(&Total(9), 1);
        Ok(())
    }
}

#[test]
fn test_write_after_dispose_is_dropped() {
    let engine = IncrementalEngine::new();
    engine
        .read_state_variable(&DisposeThenWrite(EngineHandle(engine.clone())))
        .unwrap();
    assert!(engine.is_disposed());
    // Only the writer itself; the variable never got a node.
    assert_eq!(engine.node_count(), 1);
}
