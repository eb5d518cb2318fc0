//! Background persistence.
//!
//! Store writes never run on the caller's thread. Machines hand complete
//! snapshots to a [`PersistHandle`]; a dedicated worker applies them in
//! arrival order. A write that fails is kept and retried when the next
//! operation for the same instance arrives (which normally supersedes it) or
//! when the queue is flushed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use super::{ScalarStore, StateStore};
use crate::constants::PERSIST_THREAD_NAME;
use crate::error::StoreError;
use crate::instance::{InstanceId, InstanceState};

#[derive(Debug)]
enum PersistOp {
    Save(InstanceState),
    Delete(InstanceId),
    LiveCount(usize),
    Flush(Sender<()>),
    Shutdown,
}

/// Cheap, clonable sender side of the persistence queue.
#[derive(Debug, Clone)]
pub struct PersistHandle {
    tx: Sender<PersistOp>,
}

impl PersistHandle {
    pub fn save(&self, state: InstanceState) {
        self.send(PersistOp::Save(state));
    }

    pub fn delete(&self, id: InstanceId) {
        self.send(PersistOp::Delete(id));
    }

    pub fn live_count(&self, count: usize) {
        self.send(PersistOp::LiveCount(count));
    }

    /// Block until every operation queued before this call was attempted.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.tx.send(PersistOp::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    fn send(&self, op: PersistOp) {
        if let Err(err) = self.tx.send(op) {
            tracing::debug!(op = ?err.0, "persister stopped; dropping write");
        }
    }
}

/// Owns the worker thread. Dropping it drains the queue and joins.
#[derive(Debug)]
pub struct Persister {
    handle: PersistHandle,
    worker: Option<JoinHandle<()>>,
}

impl Persister {
    pub fn spawn(
        records: Arc<dyn StateStore>,
        scalars: Arc<dyn ScalarStore>,
    ) -> Result<Self, StoreError> {
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(PERSIST_THREAD_NAME.to_string())
            .spawn(move || Worker::new(records, scalars).run(rx))?;
        Ok(Self {
            handle: PersistHandle { tx },
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> PersistHandle {
        self.handle.clone()
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        let _ = self.handle.tx.send(PersistOp::Shutdown);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("persistence worker panicked");
        }
    }
}

struct Worker {
    records: Arc<dyn StateStore>,
    scalars: Arc<dyn ScalarStore>,
    failed: BTreeMap<InstanceId, PersistOp>,
    failed_count: Option<usize>,
}

impl Worker {
    fn new(records: Arc<dyn StateStore>, scalars: Arc<dyn ScalarStore>) -> Self {
        Self {
            records,
            scalars,
            failed: BTreeMap::new(),
            failed_count: None,
        }
    }

    fn run(mut self, rx: Receiver<PersistOp>) {
        while let Ok(op) = rx.recv() {
            match op {
                PersistOp::Flush(ack) => {
                    self.retry_failed();
                    let _ = ack.send(());
                }
                PersistOp::Shutdown => break,
                op => self.apply(op),
            }
        }
        self.retry_failed();
        if !self.failed.is_empty() {
            tracing::warn!(pending = self.failed.len(), "exiting with unsaved instances");
        }
    }

    fn apply(&mut self, op: PersistOp) {
        match op {
            PersistOp::Save(state) => {
                let id = state.instance_id;
                if self.failed.remove(&id).is_some() {
                    tracing::debug!(instance = %id, "superseding failed write");
                }
                if let Err(err) = self.records.save(&state) {
                    tracing::warn!(instance = %id, error = %err, "failed to save instance");
                    self.failed.insert(id, PersistOp::Save(state));
                }
            }
            PersistOp::Delete(id) => {
                self.failed.remove(&id);
                if let Err(err) = self.records.delete(id) {
                    tracing::warn!(instance = %id, error = %err, "failed to delete instance");
                    self.failed.insert(id, PersistOp::Delete(id));
                }
            }
            PersistOp::LiveCount(count) => {
                self.failed_count = None;
                if let Err(err) = self.scalars.store_live_count(count) {
                    tracing::warn!(count, error = %err, "failed to store live count");
                    self.failed_count = Some(count);
                }
            }
            PersistOp::Flush(_) | PersistOp::Shutdown => {}
        }
    }

    fn retry_failed(&mut self) {
        let pending = std::mem::take(&mut self.failed);
        for (_, op) in pending {
            self.apply(op);
        }
        if let Some(count) = self.failed_count.take() {
            self.apply(PersistOp::LiveCount(count));
        }
    }
}
