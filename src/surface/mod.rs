//! Window-system seam.
//!
//! An [`OverlaySurface`] backend owns every native window. It is driven only
//! from the UI thread, so implementations need not be `Send`.

mod headless;
mod terminal;
mod widgets;

pub use headless::{HeadlessSurfaces, SurfaceCall, WidgetZone};
pub use terminal::TerminalSurfaces;

use crate::error::SurfaceError;
use crate::geometry::{Geometry, Point};
use crate::instance::{ContentKind, InstanceState};
use crate::pointer::PointerEvent;

/// Opaque reference to one live surface, issued by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceHandle(pub u64);

pub trait OverlaySurface {
    /// Build and attach a surface laid out for `content`.
    fn create(
        &mut self,
        geometry: Geometry,
        content: ContentKind,
    ) -> Result<SurfaceHandle, SurfaceError>;

    fn update_geometry(
        &mut self,
        handle: SurfaceHandle,
        geometry: Geometry,
    ) -> Result<(), SurfaceError>;

    /// Refresh colors, flags and displayed values from `state`.
    fn update_content(
        &mut self,
        handle: SurfaceHandle,
        state: &InstanceState,
    ) -> Result<(), SurfaceError>;

    fn destroy(&mut self, handle: SurfaceHandle) -> Result<(), SurfaceError>;

    /// Offer a pointer event to the widget hosted in `handle`. Returns `true`
    /// if the widget claims it. Events that follow a claimed press are
    /// delivered here too, and their return value is ignored.
    fn dispatch_widget_event(&mut self, handle: SurfaceHandle, event: &PointerEvent) -> bool;

    /// Topmost surface under `point`, if any.
    fn surface_at(&self, point: Point) -> Option<SurfaceHandle>;
}
