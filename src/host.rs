//! UI-thread side of the manager.
//!
//! The host owns the surface backend (through the presenter), the UI queue and
//! one drag controller per window. Nothing here is `Sync`; it lives on the
//! thread that created it and is driven by [`OverlayHost::pump`] and
//! [`OverlayHost::handle_pointer`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::drag::{DragController, DragOutcome, DragPhase};
use crate::error::OverlayError;
use crate::geometry::Bounds;
use crate::instance::{InstanceId, InstanceState, MachineEvent};
use crate::lifecycle::LifecycleCoordinator;
use crate::pointer::{PointerEvent, PointerKind};
use crate::presenter::{ReconcileOutcome, WindowPresenter};
use crate::surface::OverlaySurface;
use crate::ui_queue::{UiQueue, UiTask};

pub struct OverlayHost<S: OverlaySurface> {
    coordinator: Arc<LifecycleCoordinator>,
    queue: UiQueue,
    presenter: WindowPresenter<S>,
    drags: BTreeMap<InstanceId, DragController>,
    /// Window that owns the gesture in progress.
    captured: Option<InstanceId>,
    bounds: Option<Bounds>,
}

impl<S: OverlaySurface> std::fmt::Debug for OverlayHost<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayHost")
            .field("presenter", &self.presenter)
            .field("drags", &self.drags.len())
            .field("captured", &self.captured)
            .finish_non_exhaustive()
    }
}

impl<S: OverlaySurface> OverlayHost<S> {
    pub fn new(coordinator: Arc<LifecycleCoordinator>, queue: UiQueue, surfaces: S) -> Self {
        let registry = coordinator.registry().clone();
        let bounds = coordinator.config().screen;
        Self {
            coordinator,
            queue,
            presenter: WindowPresenter::new(surfaces, registry),
            drags: BTreeMap::new(),
            captured: None,
            bounds,
        }
    }

    pub fn coordinator(&self) -> &Arc<LifecycleCoordinator> {
        &self.coordinator
    }

    pub fn presenter(&self) -> &WindowPresenter<S> {
        &self.presenter
    }

    pub fn surfaces(&self) -> &S {
        self.presenter.surfaces()
    }

    pub fn surfaces_mut(&mut self) -> &mut S {
        self.presenter.surfaces_mut()
    }

    pub fn drag_phase(&self, id: InstanceId) -> Option<DragPhase> {
        self.drags.get(&id).map(DragController::phase)
    }

    /// New screen size, e.g. after a terminal resize.
    pub fn set_bounds(&mut self, bounds: Option<Bounds>) {
        self.bounds = bounds;
        for drag in self.drags.values_mut() {
            drag.set_bounds(bounds);
        }
    }

    /// Run every queued UI task. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(task) = self.queue.try_next() {
            handled += 1;
            match task {
                UiTask::Machine { id, token, event } => {
                    if token.is_cancelled() {
                        tracing::trace!(instance = %id, "dropping event of cancelled subscription");
                        continue;
                    }
                    match event {
                        MachineEvent::Snapshot(state) => self.present(id, state),
                        MachineEvent::Finalized(_) => self.teardown(id),
                    }
                }
                UiTask::Teardown(id) => self.teardown(id),
            }
        }
        handled
    }

    /// Route a pointer event. Returns `true` if a window consumed it.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> bool {
        if event.kind == PointerKind::Down {
            let hit = self
                .surfaces()
                .surface_at(event.position)
                .and_then(|surface| self.presenter.registry().instance_for_surface(surface));
            if let Some(previous) = self.captured.take()
                && hit != Some(previous)
            {
                self.feed(previous, &PointerEvent::cancel());
            }
            self.captured = hit;
        }
        let Some(id) = self.captured else {
            return false;
        };
        let consumed = self.feed(id, &event);
        if self.drags.get(&id).is_none_or(DragController::is_idle) {
            self.captured = None;
        }
        consumed
    }

    /// Destroy all surfaces and give up presence, leaving every instance in
    /// the store for the next start.
    pub fn suspend(&mut self) {
        self.pump();
        self.presenter.detach_all();
        self.drags.clear();
        self.captured = None;
        self.coordinator.suspend();
    }

    fn feed(&mut self, id: InstanceId, event: &PointerEvent) -> bool {
        let registry = self.presenter.registry().clone();
        let Some(drag) = self.drags.get_mut(&id) else {
            return false;
        };
        match drag.handle(event, self.presenter.surfaces_mut(), &registry) {
            Ok(outcome) => outcome != DragOutcome::Ignored,
            Err(err) => {
                self.lose(id, err);
                true
            }
        }
    }

    fn present(&mut self, id: InstanceId, mut state: InstanceState) {
        // Keep the window under the pointer while it is being dragged.
        if self.drag_phase(id) == Some(DragPhase::DraggingWindow)
            && let Some(runtime) = self.presenter.registry().runtime(id)
        {
            state.set_geometry(runtime.applied);
        }
        match self.presenter.reconcile(id, &state) {
            Ok(ReconcileOutcome::Recreated) if self.drags.contains_key(&id) => self.rebind(id),
            Ok(ReconcileOutcome::Created | ReconcileOutcome::Recreated) => {
                let drag = DragController::new(id, self.coordinator.config().drag_slop, self.bounds);
                self.drags.insert(id, drag);
                if self.captured == Some(id) {
                    self.captured = None;
                }
            }
            Ok(ReconcileOutcome::Updated { .. } | ReconcileOutcome::Ignored) => {}
            Err(err) => self.lose(id, err),
        }
    }

    /// Keep a gesture in progress attached to the rebuilt surface of `id`.
    fn rebind(&mut self, id: InstanceId) {
        if let Some(drag) = self.drags.get_mut(&id)
            && let Some(runtime) = self.presenter.registry().runtime(id)
        {
            drag.rebind(runtime.surface);
            if drag.is_idle() && self.captured == Some(id) {
                self.captured = None;
            }
        }
    }

    fn teardown(&mut self, id: InstanceId) {
        self.forget(id);
        if self.presenter.teardown(id).is_some() {
            self.coordinator.on_instance_removed(id);
        }
    }

    fn lose(&mut self, id: InstanceId, err: OverlayError) {
        self.forget(id);
        if self.presenter.lose(id, &err) {
            self.coordinator.on_instance_lost(id, &err);
        }
    }

    fn forget(&mut self, id: InstanceId) {
        self.drags.remove(&id);
        if self.captured == Some(id) {
            self.captured = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::lifecycle::{LifecyclePhase, PresenceFlag};
    use crate::store::MemoryStore;
    use crate::surface::HeadlessSurfaces;

    fn host() -> (OverlayHost<HeadlessSurfaces>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let (c, q) = LifecycleCoordinator::new(
            ManagerConfig::default(),
            store.clone(),
            store.clone(),
            Box::new(PresenceFlag::new()),
        )
        .unwrap();
        (OverlayHost::new(c, q, HeadlessSurfaces::new()), store)
    }

    #[test]
    fn pump_materializes_and_tears_down() {
        let (mut host, store) = host();
        let id = host.coordinator().add_instance().unwrap();
        host.pump();
        assert_eq!(host.surfaces().live_surfaces(), 1);
        assert_eq!(host.drag_phase(id), Some(DragPhase::Idle));

        host.coordinator().remove_instance(id).unwrap();
        host.pump();
        assert_eq!(host.surfaces().live_surfaces(), 0);
        assert_eq!(host.coordinator().phase(), LifecyclePhase::Dormant);
        host.coordinator().flush();
        assert!(store.record(id).is_none());
    }

    #[test]
    fn press_outside_windows_is_not_consumed() {
        let (mut host, _store) = host();
        host.coordinator().add_instance().unwrap();
        host.pump();
        assert!(!host.handle_pointer(PointerEvent::down(70, 20)));
        assert!(host.handle_pointer(PointerEvent::down(1, 1)));
    }

    #[test]
    fn snapshot_during_drag_keeps_window_under_pointer() {
        let (mut host, _store) = host();
        let id = host.coordinator().add_instance().unwrap();
        host.pump();
        host.handle_pointer(PointerEvent::down(1, 1));
        host.handle_pointer(PointerEvent::moved(11, 6));
        assert_eq!(host.drag_phase(id), Some(DragPhase::DraggingWindow));
        host.coordinator()
            .switch_mode(id, crate::instance::Mode::Digital)
            .unwrap();
        host.coordinator()
            .update_setting(id, "show_seconds", false.into())
            .unwrap();
        host.pump();
        let runtime = host.presenter().registry().runtime(id).unwrap();
        assert_eq!((runtime.applied.x, runtime.applied.y), (10, 5));
    }
}
