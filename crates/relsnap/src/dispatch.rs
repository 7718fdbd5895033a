//! Event dispatching
//!
//! The engine hands every exported row to an [`EventDispatcher`] bound to a
//! snapshot-scoped [`SnapshotReceiver`], obtained once per run. A
//! [`CollectingDispatcher`] is provided for tests and embedded use.

use crate::error::Result;
use crate::event::ChangeEvent;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Snapshot-scoped receiver for dispatched events.
#[async_trait]
pub trait SnapshotReceiver: Send {
    /// Signal that the snapshot delivered its last event.
    ///
    /// Called exactly once per run, after all tables are exported.
    async fn complete_snapshot(&mut self) -> Result<()>;
}

/// Outbound event pipeline the engine dispatches into.
#[async_trait]
pub trait EventDispatcher<O: Send + Sync>: Send {
    /// The receiver type handed out for one snapshot run.
    type Receiver: SnapshotReceiver;

    /// Obtain the snapshot-scoped receiver. Called once per run.
    fn snapshot_receiver(&mut self) -> Self::Receiver;

    /// Dispatch one snapshot-read event through the receiver.
    async fn dispatch_snapshot_event(
        &mut self,
        receiver: &mut Self::Receiver,
        event: ChangeEvent,
    ) -> Result<()>;

    /// Dispatch a heartbeat carrying the current offset. Called once at run end.
    async fn dispatch_heartbeat(&mut self, offset: &O) -> Result<()>;
}

/// Everything a [`CollectingDispatcher`] observed during a run.
#[derive(Debug, Default)]
pub struct DispatchLog<O> {
    /// Dispatched events, in order
    pub events: Vec<ChangeEvent>,
    /// Heartbeat offsets, in order
    pub heartbeats: Vec<O>,
    /// Number of `complete_snapshot` calls
    pub completions: u32,
    /// Number of receivers handed out
    pub receivers: u32,
}

/// Dispatcher that records everything into a shared [`DispatchLog`].
pub struct CollectingDispatcher<O> {
    log: Arc<Mutex<DispatchLog<O>>>,
}

impl<O> CollectingDispatcher<O> {
    /// Create a collecting dispatcher.
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(DispatchLog {
                events: Vec::new(),
                heartbeats: Vec::new(),
                completions: 0,
                receivers: 0,
            })),
        }
    }

    /// Shared handle to the log; survives the dispatcher being consumed.
    pub fn log(&self) -> Arc<Mutex<DispatchLog<O>>> {
        Arc::clone(&self.log)
    }
}

impl<O> Default for CollectingDispatcher<O> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver paired with [`CollectingDispatcher`].
pub struct CollectingReceiver<O> {
    log: Arc<Mutex<DispatchLog<O>>>,
}

#[async_trait]
impl<O: Send + Sync + 'static> SnapshotReceiver for CollectingReceiver<O> {
    async fn complete_snapshot(&mut self) -> Result<()> {
        self.log.lock().completions += 1;
        Ok(())
    }
}

#[async_trait]
impl<O: Clone + Send + Sync + 'static> EventDispatcher<O> for CollectingDispatcher<O> {
    type Receiver = CollectingReceiver<O>;

    fn snapshot_receiver(&mut self) -> Self::Receiver {
        self.log.lock().receivers += 1;
        CollectingReceiver {
            log: Arc::clone(&self.log),
        }
    }

    async fn dispatch_snapshot_event(
        &mut self,
        _receiver: &mut Self::Receiver,
        event: ChangeEvent,
    ) -> Result<()> {
        self.log.lock().events.push(event);
        Ok(())
    }

    async fn dispatch_heartbeat(&mut self, offset: &O) -> Result<()> {
        self.log.lock().heartbeats.push(offset.clone());
        Ok(())
    }
}
