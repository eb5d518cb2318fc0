//! Window presenter: turns machine snapshots into live surfaces.
//!
//! Runs on the UI thread only. A snapshot either creates the surface (first
//! sight, or the content kind changed), or updates the existing one in place.
//! Geometry is pushed only when it differs from what the surface already has;
//! content is pushed on every snapshot.

use std::sync::Arc;

use crate::error::{OverlayError, SurfaceError};
use crate::instance::{InstanceId, InstanceMachine, InstanceState};
use crate::registry::{InstanceRegistry, RuntimeHandle};
use crate::surface::{OverlaySurface, SurfaceHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    /// The content kind changed; the old surface was replaced.
    Recreated,
    Updated { geometry_changed: bool },
    /// The instance is no longer registered.
    Ignored,
}

pub struct WindowPresenter<S: OverlaySurface> {
    surfaces: S,
    registry: Arc<InstanceRegistry>,
}

impl<S: OverlaySurface> std::fmt::Debug for WindowPresenter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowPresenter")
            .field("live", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl<S: OverlaySurface> WindowPresenter<S> {
    pub fn new(surfaces: S, registry: Arc<InstanceRegistry>) -> Self {
        Self { surfaces, registry }
    }

    pub fn surfaces(&self) -> &S {
        &self.surfaces
    }

    pub fn surfaces_mut(&mut self) -> &mut S {
        &mut self.surfaces
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    /// Make the surface of `id` match `state`.
    ///
    /// On error the caller is expected to drop the instance with
    /// [`lose`](Self::lose); nothing is retried here.
    pub fn reconcile(
        &mut self,
        id: InstanceId,
        state: &InstanceState,
    ) -> Result<ReconcileOutcome, OverlayError> {
        if !self.registry.contains(id) {
            tracing::debug!(instance = %id, "snapshot for unregistered instance ignored");
            return Ok(ReconcileOutcome::Ignored);
        }
        let attach = |source: SurfaceError| OverlayError::SurfaceAttach { id, source };
        let content = state.content_kind();
        let geometry = state.geometry();

        let outcome = match self.registry.runtime(id) {
            Some(runtime) if runtime.content == content => {
                let geometry_changed = runtime.applied != geometry;
                if geometry_changed {
                    self.surfaces
                        .update_geometry(runtime.surface, geometry)
                        .map_err(attach)?;
                    self.registry.set_applied_geometry(id, geometry);
                }
                self.surfaces
                    .update_content(runtime.surface, state)
                    .map_err(attach)?;
                return Ok(ReconcileOutcome::Updated { geometry_changed });
            }
            Some(stale) => {
                self.registry.clear_runtime(id);
                self.destroy_best_effort(id, stale.surface);
                ReconcileOutcome::Recreated
            }
            None => ReconcileOutcome::Created,
        };

        let surface = self.surfaces.create(geometry, content).map_err(attach)?;
        self.registry.set_runtime(
            id,
            RuntimeHandle {
                surface,
                content,
                applied: geometry,
            },
        );
        self.surfaces
            .update_content(surface, state)
            .map_err(attach)?;
        tracing::debug!(instance = %id, ?content, ?outcome, "surface attached");
        Ok(outcome)
    }

    /// Remove an instance for good: cancel its subscription, destroy the
    /// surface, drop the registry entry and finalize the machine (which
    /// deletes the stored record). Returns the finalized machine.
    pub fn teardown(&mut self, id: InstanceId) -> Option<InstanceMachine> {
        self.registry.cancel_subscription(id);
        if let Some(runtime) = self.registry.clear_runtime(id) {
            self.destroy_best_effort(id, runtime.surface);
        }
        let machine = self.registry.remove(id)?;
        machine.mark_for_deletion();
        tracing::info!(instance = %id, "instance removed");
        Some(machine)
    }

    /// Drop an instance that could not be displayed. The stored record is
    /// kept so the next start tries again.
    pub fn lose(&mut self, id: InstanceId, error: &OverlayError) -> bool {
        tracing::error!(instance = %id, error = %error, "dropping instance that cannot be displayed");
        self.registry.cancel_subscription(id);
        if let Some(runtime) = self.registry.clear_runtime(id) {
            self.destroy_best_effort(id, runtime.surface);
        }
        self.registry.remove(id).is_some()
    }

    /// Destroy every surface without touching machines or records. Used when
    /// the host shuts down while instances stay persisted.
    pub fn detach_all(&mut self) {
        for id in self.registry.ids() {
            self.registry.cancel_subscription(id);
            if let Some(runtime) = self.registry.clear_runtime(id) {
                self.destroy_best_effort(id, runtime.surface);
            }
        }
    }

    fn destroy_best_effort(&mut self, id: InstanceId, surface: SurfaceHandle) {
        if let Err(err) = self.surfaces.destroy(surface) {
            tracing::warn!(instance = %id, error = %err, "failed to destroy surface");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::instance::{ContentKind, Mode, Rgb, SettingValue};
    use crate::store::{MemoryStore, Persister};
    use crate::surface::HeadlessSurfaces;

    struct Fixture {
        presenter: WindowPresenter<HeadlessSurfaces>,
        machine: InstanceMachine,
        store: Arc<MemoryStore>,
        persister: Persister,
    }

    fn fixture(mode: Mode) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let persister = Persister::spawn(store.clone(), store.clone()).unwrap();
        let registry = Arc::new(InstanceRegistry::new(4));
        let id = InstanceId::new(1).unwrap();
        let handle = persister.handle();
        let machine = registry
            .try_insert_with(|| {
                Ok(InstanceMachine::new(
                    InstanceState::new(id, mode, Geometry::default()),
                    handle,
                ))
            })
            .unwrap();
        Fixture {
            presenter: WindowPresenter::new(HeadlessSurfaces::new(), registry),
            machine,
            store,
            persister,
        }
    }

    #[test]
    fn first_snapshot_creates_surface() {
        let mut f = fixture(Mode::Digital);
        let id = f.machine.id();
        let outcome = f.presenter.reconcile(id, &f.machine.snapshot()).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Created);
        let runtime = f.presenter.registry().runtime(id).unwrap();
        assert_eq!(runtime.content, ContentKind::DigitalClock);
        assert_eq!(f.presenter.surfaces().creates(), 1);
        assert_eq!(f.presenter.surfaces().content_updates(), 1);
    }

    #[test]
    fn same_snapshot_twice_updates_no_geometry() {
        let mut f = fixture(Mode::Timer);
        let id = f.machine.id();
        let snapshot = f.machine.snapshot();
        f.presenter.reconcile(id, &snapshot).unwrap();
        f.presenter.surfaces_mut().clear_calls();
        let outcome = f.presenter.reconcile(id, &snapshot).unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Updated {
                geometry_changed: false
            }
        );
        assert_eq!(f.presenter.surfaces().geometry_updates(), 0);
        assert_eq!(f.presenter.surfaces().creates(), 0);
    }

    #[test]
    fn moved_geometry_is_one_in_place_update() {
        let mut f = fixture(Mode::Dice);
        let id = f.machine.id();
        f.presenter.reconcile(id, &f.machine.snapshot()).unwrap();
        f.machine.update_geometry(Geometry::auto_at(7, 3));
        f.presenter.reconcile(id, &f.machine.snapshot()).unwrap();
        let surfaces = f.presenter.surfaces();
        assert_eq!(surfaces.creates(), 1);
        assert_eq!(surfaces.geometry_updates(), 1);
        let runtime = f.presenter.registry().runtime(id).unwrap();
        assert_eq!(runtime.applied, Geometry::auto_at(7, 3));
    }

    #[test]
    fn content_kind_change_recreates() {
        let mut f = fixture(Mode::Digital);
        let id = f.machine.id();
        f.presenter.reconcile(id, &f.machine.snapshot()).unwrap();
        f.machine.switch_mode(Mode::Coin);
        let outcome = f.presenter.reconcile(id, &f.machine.snapshot()).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Recreated);
        assert_eq!(f.presenter.surfaces().destroys(), 1);
        assert_eq!(f.presenter.surfaces().live_surfaces(), 1);
    }

    #[test]
    fn setting_change_keeps_surface() {
        let mut f = fixture(Mode::Analog);
        let id = f.machine.id();
        f.presenter.reconcile(id, &f.machine.snapshot()).unwrap();
        f.machine
            .update_setting("color", SettingValue::Color(Rgb::RED))
            .unwrap();
        f.presenter.reconcile(id, &f.machine.snapshot()).unwrap();
        let surface = f.presenter.registry().runtime(id).unwrap().surface;
        let surfaces = f.presenter.surfaces();
        assert_eq!(surfaces.creates(), 1);
        assert_eq!(surfaces.state_of(surface).unwrap().color(), Rgb::RED);
    }

    #[test]
    fn lost_instance_keeps_record() {
        let mut f = fixture(Mode::Digital);
        let id = f.machine.id();
        f.machine.persist_now();
        f.presenter.surfaces_mut().set_fail_creates(true);
        let err = f.presenter.reconcile(id, &f.machine.snapshot()).unwrap_err();
        assert!(matches!(err, OverlayError::SurfaceAttach { .. }));
        assert!(f.presenter.lose(id, &err));
        assert!(!f.presenter.registry().contains(id));
        f.persister.handle().flush();
        assert!(f.store.record(id).is_some());
    }

    #[test]
    fn teardown_finalizes_and_deletes_record() {
        let mut f = fixture(Mode::Coin);
        let id = f.machine.id();
        f.machine.persist_now();
        f.presenter.reconcile(id, &f.machine.snapshot()).unwrap();
        let machine = f.presenter.teardown(id).unwrap();
        assert!(machine.is_deleted());
        assert_eq!(f.presenter.surfaces().live_surfaces(), 0);
        assert!(f.presenter.teardown(id).is_none());
        f.persister.handle().flush();
        assert!(f.store.record(id).is_none());
    }
}
