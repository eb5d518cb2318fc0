//! Lifecycle coordinator.
//!
//! Owns the pieces that outlive any single window: the registry, the id
//! allocator and the persistence worker. It is shared behind an `Arc` and may
//! be driven from any thread. Whatever a command means for a surface is posted
//! to the UI queue and carried out by the host.
//!
//! The coordinator holds a foreground presence exactly while at least one
//! instance is live.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::allocator::IdentityAllocator;
use crate::config::ManagerConfig;
use crate::error::OverlayError;
use crate::instance::{InstanceId, InstanceMachine, InstanceState, Mode, SettingValue};
use crate::registry::InstanceRegistry;
use crate::store::{Persister, ScalarStore, StateStore};
use crate::ui_queue::{UiHandle, UiQueue, UiTask, ui_channel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// No live instances; the process may exit.
    Dormant,
    /// At least one live instance; presence is held.
    Active,
}

/// Whatever keeps the hosting process alive while overlays are shown.
pub trait ForegroundPresence: Send + Sync {
    fn acquire(&self);
    fn release(&self);
    /// Number of live instances changed.
    fn update(&self, live: usize) {
        let _ = live;
    }
}

/// Presence backed by a pair of atomics. The terminal host polls it to know
/// when to exit.
#[derive(Debug, Clone, Default)]
pub struct PresenceFlag {
    held: Arc<AtomicBool>,
    live: Arc<AtomicUsize>,
}

impl PresenceFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl ForegroundPresence for PresenceFlag {
    fn acquire(&self) {
        self.held.store(true, Ordering::Release);
    }

    fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    fn update(&self, live: usize) {
        self.live.store(live, Ordering::Release);
    }
}

pub struct LifecycleCoordinator {
    config: ManagerConfig,
    registry: Arc<InstanceRegistry>,
    allocator: IdentityAllocator,
    records: Arc<dyn StateStore>,
    persister: Persister,
    ui: UiHandle,
    presence: Box<dyn ForegroundPresence>,
    phase: Mutex<LifecyclePhase>,
    /// Set once the store has been read. Held across restore and seeding.
    restored: Mutex<bool>,
}

impl std::fmt::Debug for LifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCoordinator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("allocator", &self.allocator)
            .field("phase", &*self.phase.lock())
            .finish_non_exhaustive()
    }
}

impl LifecycleCoordinator {
    /// Load the allocator, start the persistence worker and open the UI
    /// queue. The returned queue belongs to whichever thread hosts surfaces.
    pub fn new(
        config: ManagerConfig,
        records: Arc<dyn StateStore>,
        scalars: Arc<dyn ScalarStore>,
        presence: Box<dyn ForegroundPresence>,
    ) -> Result<(Arc<Self>, UiQueue), OverlayError> {
        let allocator = IdentityAllocator::load(scalars.clone())?;
        let persister = Persister::spawn(records.clone(), scalars)?;
        let (ui, queue) = ui_channel();
        let coordinator = Self {
            registry: Arc::new(InstanceRegistry::new(config.max_instances)),
            config,
            allocator,
            records,
            persister,
            ui,
            presence,
            phase: Mutex::new(LifecyclePhase::Dormant),
            restored: Mutex::new(false),
        };
        Ok((Arc::new(coordinator), queue))
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    pub fn phase(&self) -> LifecyclePhase {
        *self.phase.lock()
    }

    pub fn live_count(&self) -> usize {
        self.registry.len()
    }

    /// Bring back every stored instance. Runs once; later calls return 0.
    ///
    /// Records beyond the instance limit stay in the store but are not shown.
    pub fn restore(&self) -> Result<usize, OverlayError> {
        let mut restored = self.restored.lock();
        self.restore_locked(&mut restored)
    }

    /// Restore if that has not happened yet, and seed one instance when
    /// nothing is live. Concurrent callers wait for the first to finish.
    pub fn start(&self) -> Result<(), OverlayError> {
        {
            let mut restored = self.restored.lock();
            self.restore_locked(&mut restored)?;
            if self.registry.is_empty() {
                self.add_instance()?;
            }
        }
        self.ensure_active();
        Ok(())
    }

    fn restore_locked(&self, done: &mut bool) -> Result<usize, OverlayError> {
        if *done {
            return Ok(0);
        }
        *done = true;
        let mut states = self.records.load_all()?;
        states.sort_by_key(|s| s.instance_id);
        let ids: Vec<InstanceId> = states.iter().map(|s| s.instance_id).collect();
        self.allocator.restore_high_water_mark(&ids);

        let mut restored = 0;
        for mut state in states {
            let id = state.instance_id;
            let stored = state.geometry();
            state.set_geometry(self.config.restore_geometry(stored));
            let clamped = state.geometry() != stored;
            let persist = self.persister.handle();
            match self
                .registry
                .try_insert_with(|| Ok(InstanceMachine::new(state, persist)))
            {
                Ok(machine) => {
                    if clamped {
                        machine.persist_now();
                    }
                    self.watch(&machine);
                    restored += 1;
                }
                Err(OverlayError::CapacityExceeded { max }) => {
                    tracing::warn!(instance = %id, max, "instance limit reached; record left in store");
                }
                Err(OverlayError::DuplicateInstance(_)) => {
                    tracing::warn!(instance = %id, "duplicate record for a live instance skipped");
                }
                Err(err) => {
                    tracing::warn!(instance = %id, error = %err, "failed to restore instance");
                }
            }
        }
        if restored > 0 {
            self.ensure_active();
        }
        self.publish_live_count();
        tracing::info!(restored, "restored persisted instances");
        Ok(restored)
    }

    pub fn add_instance(&self) -> Result<InstanceId, OverlayError> {
        let persist = self.persister.handle();
        let machine = self.registry.try_insert_with(|| {
            let id = self.allocator.next()?;
            let slot = (id.get() as usize - 1) % self.config.max_instances.max(1);
            let state = InstanceState::new(id, self.config.default_mode, self.config.cascade(slot));
            Ok(InstanceMachine::new(state, persist))
        })?;
        machine.persist_now();
        let id = machine.id();
        self.watch(&machine);
        self.ensure_active();
        self.publish_live_count();
        tracing::info!(instance = %id, live = self.registry.len(), "instance added");
        Ok(id)
    }

    pub fn update_setting(
        &self,
        id: InstanceId,
        key: &str,
        value: SettingValue,
    ) -> Result<bool, OverlayError> {
        self.machine(id)?.update_setting(key, value)
    }

    /// Parse `raw` against the schema of the instance's current mode.
    pub fn parse_setting(
        &self,
        id: InstanceId,
        key: &str,
        raw: &str,
    ) -> Result<SettingValue, OverlayError> {
        let mode = self.machine(id)?.snapshot().mode;
        let spec = mode
            .spec(key)
            .ok_or_else(|| OverlayError::invalid_setting(key, mode, "not a setting of this mode"))?;
        spec.kind
            .parse(raw)
            .map_err(|reason| OverlayError::invalid_setting(key, mode, reason))
    }

    pub fn switch_mode(&self, id: InstanceId, mode: Mode) -> Result<bool, OverlayError> {
        Ok(self.machine(id)?.switch_mode(mode))
    }

    /// Stop an instance. The subscription is cancelled before this returns;
    /// the surface and record go away once the host runs the teardown.
    pub fn remove_instance(&self, id: InstanceId) -> Result<(), OverlayError> {
        if !self.registry.contains(id) {
            tracing::warn!(instance = %id, "remove for unknown instance ignored");
            return Err(OverlayError::UnknownInstance(id));
        }
        self.registry.cancel_subscription(id);
        self.ui.post(UiTask::Teardown(id));
        Ok(())
    }

    /// Remove every live instance. Returns how many teardowns were queued.
    pub fn stop_all(&self) -> usize {
        let ids = self.registry.ids();
        let mut queued = 0;
        for id in ids {
            if self.remove_instance(id).is_ok() {
                queued += 1;
            }
        }
        self.settle();
        tracing::info!(queued, "stopping all instances");
        queued
    }

    /// The host finished tearing down `id`.
    pub fn on_instance_removed(&self, id: InstanceId) {
        tracing::debug!(instance = %id, "teardown complete");
        self.publish_live_count();
        self.settle();
    }

    /// The host dropped `id` because it could not be displayed.
    pub fn on_instance_lost(&self, id: InstanceId, error: &OverlayError) {
        tracing::warn!(instance = %id, error = %error, "instance lost");
        self.publish_live_count();
        self.settle();
    }

    /// Wait for queued store writes to land.
    pub fn flush(&self) {
        self.persister.handle().flush();
    }

    /// Give up presence without deleting anything. Used when the host exits
    /// while instances should come back on the next start.
    pub fn suspend(&self) {
        if self.config.report_live_count {
            self.persister.handle().live_count(0);
        }
        self.presence.update(0);
        self.flush();
        let mut phase = self.phase.lock();
        if *phase == LifecyclePhase::Active {
            self.presence.release();
            *phase = LifecyclePhase::Dormant;
        }
        tracing::info!(live = self.registry.len(), "suspended with instances persisted");
    }

    fn machine(&self, id: InstanceId) -> Result<InstanceMachine, OverlayError> {
        self.registry.machine(id).ok_or_else(|| {
            tracing::warn!(instance = %id, "command for unknown instance ignored");
            OverlayError::UnknownInstance(id)
        })
    }

    fn watch(&self, machine: &InstanceMachine) {
        let ui = self.ui.clone();
        let id = machine.id();
        let handle = machine.subscribe(move |token, event| {
            ui.post(UiTask::Machine {
                id,
                token: token.clone(),
                event: event.clone(),
            });
        });
        self.registry.attach_subscription(id, handle);
    }

    fn ensure_active(&self) {
        let mut phase = self.phase.lock();
        if *phase == LifecyclePhase::Dormant && !self.registry.is_empty() {
            self.presence.acquire();
            *phase = LifecyclePhase::Active;
            tracing::info!("foreground presence acquired");
        }
    }

    /// Go dormant if nothing is live any more.
    fn settle(&self) {
        let mut phase = self.phase.lock();
        if *phase == LifecyclePhase::Active && self.registry.is_empty() {
            self.presence.release();
            *phase = LifecyclePhase::Dormant;
            tracing::info!("foreground presence released");
        }
    }

    fn publish_live_count(&self) {
        let live = self.registry.len();
        if self.config.report_live_count {
            self.persister.handle().live_count(live);
        }
        self.presence.update(live);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::store::MemoryStore;

    fn coordinator(store: &Arc<MemoryStore>) -> (Arc<LifecycleCoordinator>, UiQueue, PresenceFlag) {
        let presence = PresenceFlag::new();
        let (c, q) = LifecycleCoordinator::new(
            ManagerConfig::default(),
            store.clone(),
            store.clone(),
            Box::new(presence.clone()),
        )
        .unwrap();
        (c, q, presence)
    }

    #[test]
    fn add_activates_and_counts() {
        let store = Arc::new(MemoryStore::new());
        let (c, _q, presence) = coordinator(&store);
        assert_eq!(c.phase(), LifecyclePhase::Dormant);
        let id = c.add_instance().unwrap();
        assert_eq!(c.phase(), LifecyclePhase::Active);
        assert!(presence.is_held());
        assert_eq!(presence.live(), 1);
        c.flush();
        assert!(store.record(id).is_some());
        assert_eq!(store.load_live_count().unwrap(), 1);
    }

    #[test]
    fn start_seeds_one_instance() {
        let store = Arc::new(MemoryStore::new());
        let (c, _q, _p) = coordinator(&store);
        c.start().unwrap();
        assert_eq!(c.live_count(), 1);
        c.start().unwrap();
        assert_eq!(c.live_count(), 1);
    }

    #[test]
    fn concurrent_starts_seed_once() {
        let store = Arc::new(MemoryStore::new());
        let (c, _q, _p) = coordinator(&store);
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&c);
                std::thread::spawn(move || c.start())
            })
            .collect();
        for worker in workers {
            worker.join().unwrap().unwrap();
        }
        assert_eq!(c.live_count(), 1);
        assert_eq!(c.phase(), LifecyclePhase::Active);
    }

    #[test]
    fn command_process_leaves_live_count_alone() {
        let store = Arc::new(MemoryStore::new());
        store.store_live_count(3).unwrap();
        let (c, _q) = LifecycleCoordinator::new(
            ManagerConfig::default().without_live_count(),
            store.clone(),
            store.clone(),
            Box::new(PresenceFlag::new()),
        )
        .unwrap();
        c.add_instance().unwrap();
        c.suspend();
        assert_eq!(store.load_live_count().unwrap(), 3);
    }

    #[test]
    fn failed_high_water_write_rejects_add() {
        let store = Arc::new(MemoryStore::new());
        let (c, _q, _p) = coordinator(&store);
        store.set_fail_scalars(true);
        let err = c.add_instance().unwrap_err();
        assert!(matches!(err, OverlayError::Persistence(_)));
        assert_eq!(c.live_count(), 0);
        assert_eq!(c.phase(), LifecyclePhase::Dormant);
    }

    #[test]
    fn remove_posts_teardown_after_cancelling() {
        let store = Arc::new(MemoryStore::new());
        let (c, q, _p) = coordinator(&store);
        let id = c.add_instance().unwrap();
        while q.try_next().is_some() {}
        c.remove_instance(id).unwrap();
        match q.try_next() {
            Some(UiTask::Teardown(got)) => assert_eq!(got, id),
            other => panic!("expected teardown, got {other:?}"),
        }
        let missing = InstanceId::new(99).unwrap();
        assert!(matches!(
            c.remove_instance(missing),
            Err(OverlayError::UnknownInstance(_))
        ));
    }

    #[test]
    fn restore_clamps_into_screen() {
        let store = Arc::new(MemoryStore::new());
        let id = InstanceId::new(4).unwrap();
        store
            .save(&InstanceState::new(id, Mode::Coin, Geometry::auto_at(500, -3)))
            .unwrap();
        let presence = PresenceFlag::new();
        let config = ManagerConfig::default().with_screen(crate::geometry::Bounds::new(80, 24));
        let (c, _q) =
            LifecycleCoordinator::new(config, store.clone(), store.clone(), Box::new(presence))
                .unwrap();
        assert_eq!(c.restore().unwrap(), 1);
        let restored = c.registry().machine(id).unwrap().snapshot();
        assert_eq!(restored.geometry(), Geometry::auto_at(76, 0));
        assert_eq!(c.add_instance().unwrap().get(), 5);
    }
}
