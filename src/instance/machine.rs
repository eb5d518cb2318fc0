//! Per-instance state machine.
//!
//! An [`InstanceMachine`] is the only owner of one overlay's logical state.
//! Every mutation is a discrete operation that produces a new snapshot; the
//! snapshot is pushed to subscribers only if it differs from the previous one,
//! and handed to the background persister in the same critical section so the
//! store observes changes in the order they happened.
//!
//! Subscriber callbacks run while the machine lock is held. They must be cheap
//! and must not call back into the machine; in practice they only enqueue a
//! task for the UI thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{InstanceId, InstanceState, Mode, SettingValue};
use crate::error::OverlayError;
use crate::geometry::Geometry;
use crate::store::PersistHandle;

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Something a machine reports to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineEvent {
    Snapshot(InstanceState),
    /// The machine was marked for deletion; no further snapshots follow.
    Finalized(InstanceId),
}

/// Shared liveness flag of one subscription.
///
/// Work queued on behalf of a subscription carries a clone of its token, so a
/// consumer can drop stale work after the subscription was cancelled.
#[derive(Debug, Clone)]
pub struct SubscriptionToken {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl SubscriptionToken {
    fn new() -> Self {
        Self {
            id: NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

type Callback = Box<dyn Fn(&SubscriptionToken, &MachineEvent) + Send>;

struct Subscriber {
    token: SubscriptionToken,
    callback: Callback,
}

struct MachineInner {
    state: InstanceState,
    deleted: bool,
    subscribers: Vec<Subscriber>,
}

impl MachineInner {
    fn emit(&self, event: &MachineEvent) {
        for sub in &self.subscribers {
            if !sub.token.is_cancelled() {
                (sub.callback)(&sub.token, event);
            }
        }
    }
}

/// Cancels its subscription when cancelled explicitly or dropped.
#[derive(Debug)]
pub struct SubscriptionHandle {
    token: SubscriptionToken,
    machine: Weak<Mutex<MachineInner>>,
}

impl SubscriptionHandle {
    pub fn token(&self) -> &SubscriptionToken {
        &self.token
    }

    /// Detach the callback. Once this returns the callback is never invoked
    /// again. Calling it more than once is harmless.
    pub fn cancel(&self) {
        self.token.cancelled.store(true, Ordering::Release);
        if let Some(inner) = self.machine.upgrade() {
            let mut inner = inner.lock();
            inner.subscribers.retain(|sub| sub.token.id != self.token.id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for MachineInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineInner")
            .field("state", &self.state)
            .field("deleted", &self.deleted)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct InstanceMachine {
    id: InstanceId,
    inner: Arc<Mutex<MachineInner>>,
    persist: PersistHandle,
}

impl InstanceMachine {
    /// Build a machine seeded from `state`. Settings are normalized against
    /// the mode schema so records written by older builds still validate.
    pub fn new(mut state: InstanceState, persist: PersistHandle) -> Self {
        state.settings = state.mode.normalize(&state.settings);
        Self {
            id: state.instance_id,
            inner: Arc::new(Mutex::new(MachineInner {
                state,
                deleted: false,
                subscribers: Vec::new(),
            })),
            persist,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn snapshot(&self) -> InstanceState {
        self.inner.lock().state.clone()
    }

    pub fn is_deleted(&self) -> bool {
        self.inner.lock().deleted
    }

    /// Register `callback`. The current snapshot is delivered before this
    /// returns, so it always precedes the effect of any later operation.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&SubscriptionToken, &MachineEvent) + Send + 'static,
    {
        let token = SubscriptionToken::new();
        let mut inner = self.inner.lock();
        let first = if inner.deleted {
            MachineEvent::Finalized(self.id)
        } else {
            MachineEvent::Snapshot(inner.state.clone())
        };
        callback(&token, &first);
        inner.subscribers.push(Subscriber {
            token: token.clone(),
            callback: Box::new(callback),
        });
        SubscriptionHandle {
            token,
            machine: Arc::downgrade(&self.inner),
        }
    }

    /// Write the current snapshot to the store again, e.g. after a failed
    /// write or when the record has to be re-created.
    pub fn persist_now(&self) {
        let inner = self.inner.lock();
        if !inner.deleted {
            self.persist.save(inner.state.clone());
        }
    }

    pub fn update_geometry(&self, geometry: Geometry) -> bool {
        self.apply(|state| {
            state.set_geometry(geometry);
            Ok(())
        })
        .unwrap_or(false)
    }

    pub fn update_setting(&self, key: &str, value: SettingValue) -> Result<bool, OverlayError> {
        let result = self.apply(|state| {
            let spec = state.mode.spec(key).ok_or_else(|| {
                OverlayError::invalid_setting(key, state.mode, "not a setting of this mode")
            })?;
            spec.kind
                .check(&value)
                .map_err(|reason| OverlayError::invalid_setting(key, state.mode, reason))?;
            state.settings.insert(key.to_string(), value);
            Ok(())
        });
        if let Err(err) = &result {
            tracing::warn!(instance = %self.id, error = %err, "rejected setting update");
        }
        result
    }

    /// Change the widget variant. Mode-specific settings are reset to the new
    /// mode's defaults; geometry is kept. Switching to the current mode is a
    /// no-op.
    pub fn switch_mode(&self, mode: Mode) -> bool {
        self.apply(|state| {
            if state.mode != mode {
                state.mode = mode;
                state.settings = mode.default_settings();
            }
            Ok(())
        })
        .unwrap_or(false)
    }

    /// Terminal transition. Subscribers receive [`MachineEvent::Finalized`]
    /// and the stored record is deleted. Returns `false` if the machine was
    /// already marked.
    pub fn mark_for_deletion(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.deleted {
            return false;
        }
        inner.deleted = true;
        inner.emit(&MachineEvent::Finalized(self.id));
        self.persist.delete(self.id);
        tracing::debug!(instance = %self.id, "instance finalized");
        true
    }

    fn apply<F>(&self, mutate: F) -> Result<bool, OverlayError>
    where
        F: FnOnce(&mut InstanceState) -> Result<(), OverlayError>,
    {
        let mut inner = self.inner.lock();
        if inner.deleted {
            return Ok(false);
        }
        let mut next = inner.state.clone();
        mutate(&mut next)?;
        if next == inner.state {
            return Ok(false);
        }
        inner.state = next;
        inner.emit(&MachineEvent::Snapshot(inner.state.clone()));
        self.persist.save(inner.state.clone());
        Ok(true)
    }
}
