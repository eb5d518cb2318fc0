//! Instance registry: the single source of truth for what is on screen.
//!
//! Commands reach the registry from arbitrary threads, so every access goes
//! through one `RwLock`. The capacity check and the insert happen inside the
//! same write section, which is what keeps concurrent adds from overshooting
//! the limit.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::OverlayError;
use crate::geometry::Geometry;
use crate::instance::{ContentKind, InstanceId, InstanceMachine, SubscriptionHandle};
use crate::surface::SurfaceHandle;

/// Ephemeral link between an instance and its live surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeHandle {
    pub surface: SurfaceHandle,
    pub content: ContentKind,
    /// Geometry the surface currently has. Can run ahead of the machine
    /// while a drag is in flight.
    pub applied: Geometry,
}

#[derive(Debug)]
struct RegistryEntry {
    machine: InstanceMachine,
    subscription: Option<SubscriptionHandle>,
    runtime: Option<RuntimeHandle>,
}

#[derive(Debug)]
pub struct InstanceRegistry {
    entries: RwLock<BTreeMap<InstanceId, RegistryEntry>>,
    capacity: usize,
}

impl InstanceRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.entries.read().contains_key(&id)
    }

    pub fn ids(&self) -> Vec<InstanceId> {
        self.entries.read().keys().copied().collect()
    }

    pub fn machine(&self, id: InstanceId) -> Option<InstanceMachine> {
        self.entries.read().get(&id).map(|e| e.machine.clone())
    }

    /// Build and insert a machine if there is room. `build` runs while the
    /// write lock is held, so it must not touch the registry. A machine whose
    /// id is already live is rejected and the live entry is left alone.
    pub fn try_insert_with<F>(&self, build: F) -> Result<InstanceMachine, OverlayError>
    where
        F: FnOnce() -> Result<InstanceMachine, OverlayError>,
    {
        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            return Err(OverlayError::CapacityExceeded {
                max: self.capacity,
            });
        }
        let machine = build()?;
        if entries.contains_key(&machine.id()) {
            return Err(OverlayError::DuplicateInstance(machine.id()));
        }
        entries.insert(
            machine.id(),
            RegistryEntry {
                machine: machine.clone(),
                subscription: None,
                runtime: None,
            },
        );
        Ok(machine)
    }

    /// Store `handle` for `id`. If the instance is already gone the handle is
    /// dropped, which cancels it.
    pub fn attach_subscription(&self, id: InstanceId, handle: SubscriptionHandle) -> bool {
        let outcome = {
            let mut entries = self.entries.write();
            match entries.get_mut(&id) {
                Some(entry) => Ok(entry.subscription.replace(handle)),
                None => Err(handle),
            }
        };
        match outcome {
            Ok(previous) => {
                if let Some(previous) = previous {
                    previous.cancel();
                }
                true
            }
            Err(handle) => {
                handle.cancel();
                false
            }
        }
    }

    /// Cancel the subscription of `id` synchronously. Returns whether one was
    /// active.
    pub fn cancel_subscription(&self, id: InstanceId) -> bool {
        let taken = self
            .entries
            .write()
            .get_mut(&id)
            .and_then(|e| e.subscription.take());
        match taken {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn runtime(&self, id: InstanceId) -> Option<RuntimeHandle> {
        self.entries.read().get(&id).and_then(|e| e.runtime)
    }

    pub fn set_runtime(&self, id: InstanceId, runtime: RuntimeHandle) -> bool {
        match self.entries.write().get_mut(&id) {
            Some(entry) => {
                entry.runtime = Some(runtime);
                true
            }
            None => false,
        }
    }

    pub fn clear_runtime(&self, id: InstanceId) -> Option<RuntimeHandle> {
        self.entries
            .write()
            .get_mut(&id)
            .and_then(|e| e.runtime.take())
    }

    pub fn set_applied_geometry(&self, id: InstanceId, geometry: Geometry) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(&id).and_then(|e| e.runtime.as_mut()) {
            Some(runtime) => {
                runtime.applied = geometry;
                true
            }
            None => false,
        }
    }

    pub fn instance_for_surface(&self, surface: SurfaceHandle) -> Option<InstanceId> {
        self.entries
            .read()
            .iter()
            .find(|(_, e)| e.runtime.is_some_and(|rt| rt.surface == surface))
            .map(|(id, _)| *id)
    }

    /// Drop the entry for `id` and return its machine. Any remaining
    /// subscription is cancelled.
    pub fn remove(&self, id: InstanceId) -> Option<InstanceMachine> {
        let entry = self.entries.write().remove(&id)?;
        if let Some(subscription) = entry.subscription {
            subscription.cancel();
        }
        Some(entry.machine)
    }
}
