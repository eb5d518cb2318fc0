use std::collections::BTreeMap;

use super::{OverlaySurface, SurfaceHandle};
use crate::error::SurfaceError;
use crate::geometry::{Geometry, Point};
use crate::instance::{ContentKind, InstanceState};
use crate::pointer::PointerEvent;

/// Every backend call a [`HeadlessSurfaces`] received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Create {
        handle: SurfaceHandle,
        geometry: Geometry,
        content: ContentKind,
    },
    UpdateGeometry {
        handle: SurfaceHandle,
        geometry: Geometry,
    },
    UpdateContent {
        handle: SurfaceHandle,
    },
    Destroy {
        handle: SurfaceHandle,
    },
}

/// Region, relative to a surface origin, in which the hosted widget claims
/// presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetZone {
    pub dx: i32,
    pub dy: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone)]
struct LiveSurface {
    geometry: Geometry,
    content: ContentKind,
    state: Option<InstanceState>,
    z: u64,
}

impl LiveSurface {
    fn contains(&self, point: Point) -> bool {
        let (pw, ph) = self.content.preferred_size();
        let w = self.geometry.width.resolve(pw) as i32;
        let h = self.geometry.height.resolve(ph) as i32;
        point.x >= self.geometry.x
            && point.y >= self.geometry.y
            && point.x < self.geometry.x + w
            && point.y < self.geometry.y + h
    }
}

/// Surface backend without a display.
///
/// Keeps surfaces in memory, logs every call, and lets callers script
/// failures and widget hit regions. One-shot command line invocations use it
/// to run the manager without opening a terminal UI.
#[derive(Debug, Default)]
pub struct HeadlessSurfaces {
    next_handle: u64,
    next_z: u64,
    live: BTreeMap<SurfaceHandle, LiveSurface>,
    calls: Vec<SurfaceCall>,
    fail_creates: bool,
    fail_updates: bool,
    widget_zone: Option<WidgetZone>,
    widget_events: Vec<(SurfaceHandle, PointerEvent)>,
}

impl HeadlessSurfaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[SurfaceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn creates(&self) -> usize {
        self.count(|c| matches!(c, SurfaceCall::Create { .. }))
    }

    pub fn destroys(&self) -> usize {
        self.count(|c| matches!(c, SurfaceCall::Destroy { .. }))
    }

    pub fn geometry_updates(&self) -> usize {
        self.count(|c| matches!(c, SurfaceCall::UpdateGeometry { .. }))
    }

    pub fn content_updates(&self) -> usize {
        self.count(|c| matches!(c, SurfaceCall::UpdateContent { .. }))
    }

    fn count(&self, pred: impl Fn(&SurfaceCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn live_surfaces(&self) -> usize {
        self.live.len()
    }

    pub fn geometry_of(&self, handle: SurfaceHandle) -> Option<Geometry> {
        self.live.get(&handle).map(|s| s.geometry)
    }

    pub fn content_of(&self, handle: SurfaceHandle) -> Option<ContentKind> {
        self.live.get(&handle).map(|s| s.content)
    }

    /// Last state pushed through `update_content`.
    pub fn state_of(&self, handle: SurfaceHandle) -> Option<&InstanceState> {
        self.live.get(&handle).and_then(|s| s.state.as_ref())
    }

    pub fn set_fail_creates(&mut self, fail: bool) {
        self.fail_creates = fail;
    }

    pub fn set_fail_updates(&mut self, fail: bool) {
        self.fail_updates = fail;
    }

    pub fn set_widget_zone(&mut self, zone: Option<WidgetZone>) {
        self.widget_zone = zone;
    }

    pub fn widget_events(&self) -> &[(SurfaceHandle, PointerEvent)] {
        &self.widget_events
    }

    fn live_mut(&mut self, handle: SurfaceHandle) -> Result<&mut LiveSurface, SurfaceError> {
        self.live
            .get_mut(&handle)
            .ok_or(SurfaceError::UnknownSurface(handle))
    }
}

impl OverlaySurface for HeadlessSurfaces {
    fn create(
        &mut self,
        geometry: Geometry,
        content: ContentKind,
    ) -> Result<SurfaceHandle, SurfaceError> {
        if self.fail_creates {
            return Err(SurfaceError::Rejected("headless create refused".into()));
        }
        self.next_handle += 1;
        self.next_z += 1;
        let handle = SurfaceHandle(self.next_handle);
        self.live.insert(
            handle,
            LiveSurface {
                geometry,
                content,
                state: None,
                z: self.next_z,
            },
        );
        self.calls.push(SurfaceCall::Create {
            handle,
            geometry,
            content,
        });
        Ok(handle)
    }

    fn update_geometry(
        &mut self,
        handle: SurfaceHandle,
        geometry: Geometry,
    ) -> Result<(), SurfaceError> {
        if self.fail_updates {
            return Err(SurfaceError::Rejected("headless update refused".into()));
        }
        self.live_mut(handle)?.geometry = geometry;
        self.calls
            .push(SurfaceCall::UpdateGeometry { handle, geometry });
        Ok(())
    }

    fn update_content(
        &mut self,
        handle: SurfaceHandle,
        state: &InstanceState,
    ) -> Result<(), SurfaceError> {
        if self.fail_updates {
            return Err(SurfaceError::Rejected("headless update refused".into()));
        }
        self.live_mut(handle)?.state = Some(state.clone());
        self.calls.push(SurfaceCall::UpdateContent { handle });
        Ok(())
    }

    fn destroy(&mut self, handle: SurfaceHandle) -> Result<(), SurfaceError> {
        self.live
            .remove(&handle)
            .ok_or(SurfaceError::UnknownSurface(handle))?;
        self.calls.push(SurfaceCall::Destroy { handle });
        Ok(())
    }

    fn dispatch_widget_event(&mut self, handle: SurfaceHandle, event: &PointerEvent) -> bool {
        let Some(surface) = self.live.get(&handle) else {
            return false;
        };
        self.widget_events.push((handle, *event));
        let Some(zone) = self.widget_zone else {
            return false;
        };
        let dx = event.position.x - surface.geometry.x;
        let dy = event.position.y - surface.geometry.y;
        (zone.dx..zone.dx + zone.width).contains(&dx)
            && (zone.dy..zone.dy + zone.height).contains(&dy)
    }

    fn surface_at(&self, point: Point) -> Option<SurfaceHandle> {
        self.live
            .iter()
            .filter(|(_, s)| s.contains(point))
            .max_by_key(|(_, s)| s.z)
            .map(|(handle, _)| *handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topmost_surface_wins_hit_test() {
        let mut s = HeadlessSurfaces::new();
        let a = s.create(Geometry::auto_at(0, 0), ContentKind::DiceTray).unwrap();
        let b = s.create(Geometry::auto_at(5, 1), ContentKind::CoinFlip).unwrap();
        assert_eq!(s.surface_at(Point::new(6, 2)), Some(b));
        assert_eq!(s.surface_at(Point::new(1, 1)), Some(a));
        assert_eq!(s.surface_at(Point::new(100, 100)), None);
    }

    #[test]
    fn destroyed_surface_rejects_updates() {
        let mut s = HeadlessSurfaces::new();
        let a = s.create(Geometry::default(), ContentKind::Countdown).unwrap();
        s.destroy(a).unwrap();
        assert_eq!(
            s.update_geometry(a, Geometry::auto_at(1, 1)),
            Err(SurfaceError::UnknownSurface(a))
        );
        assert!(s.destroy(a).is_err());
    }
}
