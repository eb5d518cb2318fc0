//! Marshaling onto the UI thread.
//!
//! Anything that ends up touching a surface is expressed as a [`UiTask`] and
//! posted through a [`UiHandle`], which any thread may hold. The thread that
//! owns the [`UiQueue`] (the host's thread) is by definition the UI thread.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use crate::instance::{InstanceId, MachineEvent, SubscriptionToken};

#[derive(Debug)]
pub enum UiTask {
    /// A state machine emitted; reconcile unless `token` was cancelled.
    Machine {
        id: InstanceId,
        token: SubscriptionToken,
        event: MachineEvent,
    },
    /// Finish removing an instance whose subscription was already cancelled.
    Teardown(InstanceId),
}

#[derive(Debug, Clone)]
pub struct UiHandle {
    tx: Sender<UiTask>,
}

impl UiHandle {
    pub fn post(&self, task: UiTask) {
        if let Err(err) = self.tx.send(task) {
            tracing::debug!(task = ?err.0, "ui queue closed; dropping task");
        }
    }
}

#[derive(Debug)]
pub struct UiQueue {
    rx: Receiver<UiTask>,
}

impl UiQueue {
    /// Next pending task without blocking.
    pub fn try_next(&self) -> Option<UiTask> {
        match self.rx.try_recv() {
            Ok(task) => Some(task),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

pub fn ui_channel() -> (UiHandle, UiQueue) {
    let (tx, rx) = mpsc::channel();
    (UiHandle { tx }, UiQueue { rx })
}
