//! Background auto-validation.
//!
//! Activated computations are queued here when they leave the `Valid` state.
//! The worker thread is spawned on first use and holds only a weak reference
//! to the engine, so dropping the last engine handle ends it.

use std::sync::Weak;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::engine::EngineInner;
use crate::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerMessage {
    /// Bring this node up to date if it is still activated.
    Validate(NodeId),
    /// Apply pending external modifications.
    Drain,
    Stop,
}

pub(crate) struct Worker {
    sender: Sender<WorkerMessage>,
    receiver: Receiver<WorkerMessage>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        let (sender, receiver) = match capacity {
            Some(capacity) => crossbeam_channel::bounded(capacity),
            None => crossbeam_channel::unbounded(),
        };
        Self {
            sender,
            receiver,
            handle: Mutex::new(None),
        }
    }

    pub(crate) fn is_started(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Spawn the worker thread unless it is running already.
    pub(crate) fn ensure_started(&self, engine: Weak<EngineInner>) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return;
        }
        let receiver = self.receiver.clone();
        match thread::Builder::new()
            .name("stateflow-auto-validation".into())
            .spawn(move || run(engine, receiver))
        {
            Ok(spawned) => *handle = Some(spawned),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "failed to spawn auto-validation worker; flush() still validates"
                );
            }
        }
    }

    /// Queue a message without blocking. A full queue drops the message;
    /// `flush` picks up whatever the worker missed.
    pub(crate) fn send(&self, message: WorkerMessage) {
        match self.sender.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                tracing::trace!(?message, "auto-validation queue full, dropping message");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Ask the worker to exit. Does not wait for it: the caller may hold the
    /// engine lock the worker is waiting on.
    pub(crate) fn stop(&self) {
        // A full queue is fine: the worker checks for disposal before every
        // message and exits once the engine is gone.
        let _ = self.sender.try_send(WorkerMessage::Stop);
        self.handle.lock().take();
    }
}

fn run(engine: Weak<EngineInner>, receiver: Receiver<WorkerMessage>) {
    while let Ok(message) = receiver.recv() {
        let target = match message {
            WorkerMessage::Stop => break,
            WorkerMessage::Validate(id) => Some(id),
            WorkerMessage::Drain => None,
        };
        let Some(engine) = engine.upgrade() else {
            break;
        };
        if engine.is_disposed() {
            break;
        }
        engine.auto_validate(target);
    }
    tracing::trace!("auto-validation worker stopped");
}
