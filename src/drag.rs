//! Pointer gesture arbitration for one overlay window.
//!
//! A press is offered to the hosted widget first. If the widget claims it the
//! whole gesture belongs to the widget. Otherwise the press arms a window
//! drag, which starts once the pointer travels further than the slop. While
//! dragging, positions go straight to the surface and the registry's applied
//! geometry; the machine only hears about the final position on release.

use crate::error::OverlayError;
use crate::geometry::{Bounds, Geometry, Point};
use crate::instance::InstanceId;
use crate::pointer::{PointerEvent, PointerKind};
use crate::registry::InstanceRegistry;
use crate::surface::{OverlaySurface, SurfaceHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPhase {
    Idle,
    Armed,
    DraggingWindow,
    DelegatedToWidget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    /// The event was not for this window.
    Ignored,
    Armed,
    /// The hosted widget owns the gesture.
    Delegated,
    /// The surface was moved; nothing committed yet.
    Moved(Geometry),
    /// Release after a drag; the final geometry went to the machine.
    Committed(Geometry),
    /// Gesture ended without a geometry commit.
    Released,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
enum Gesture {
    Idle,
    Armed {
        surface: SurfaceHandle,
        pointer: Point,
        window: Geometry,
    },
    Dragging {
        surface: SurfaceHandle,
        pointer: Point,
        window: Geometry,
        current: Geometry,
    },
    Delegated {
        surface: SurfaceHandle,
    },
}

#[derive(Debug)]
pub struct DragController {
    id: InstanceId,
    slop: u16,
    bounds: Option<Bounds>,
    gesture: Gesture,
}

impl DragController {
    pub fn new(id: InstanceId, slop: u16, bounds: Option<Bounds>) -> Self {
        Self {
            id,
            slop,
            bounds,
            gesture: Gesture::Idle,
        }
    }

    pub fn phase(&self) -> DragPhase {
        match self.gesture {
            Gesture::Idle => DragPhase::Idle,
            Gesture::Armed { .. } => DragPhase::Armed,
            Gesture::Dragging { .. } => DragPhase::DraggingWindow,
            Gesture::Delegated { .. } => DragPhase::DelegatedToWidget,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.gesture, Gesture::Idle)
    }

    /// The window's surface was rebuilt as `surface`. A window gesture keeps
    /// going on the new surface; a widget gesture ends because the new widget
    /// never saw the press.
    pub fn rebind(&mut self, surface: SurfaceHandle) {
        self.gesture = match self.gesture {
            Gesture::Idle | Gesture::Delegated { .. } => Gesture::Idle,
            Gesture::Armed {
                pointer, window, ..
            } => Gesture::Armed {
                surface,
                pointer,
                window,
            },
            Gesture::Dragging {
                pointer,
                window,
                current,
                ..
            } => Gesture::Dragging {
                surface,
                pointer,
                window,
                current,
            },
        };
    }

    pub fn set_bounds(&mut self, bounds: Option<Bounds>) {
        self.bounds = bounds;
    }

    /// Feed one pointer event. Errors come from the surface refusing a move
    /// and mean the window can no longer be displayed.
    pub fn handle<S: OverlaySurface>(
        &mut self,
        event: &PointerEvent,
        surfaces: &mut S,
        registry: &InstanceRegistry,
    ) -> Result<DragOutcome, OverlayError> {
        match event.kind {
            PointerKind::Down => {
                if !self.is_idle() {
                    self.cancel(surfaces, registry)?;
                }
                self.press(event, surfaces, registry)
            }
            PointerKind::Move => self.motion(event, surfaces, registry),
            PointerKind::Up => self.release(event, surfaces, registry),
            PointerKind::Cancel => self.cancel(surfaces, registry),
        }
    }

    fn press<S: OverlaySurface>(
        &mut self,
        event: &PointerEvent,
        surfaces: &mut S,
        registry: &InstanceRegistry,
    ) -> Result<DragOutcome, OverlayError> {
        let Some(runtime) = registry.runtime(self.id) else {
            return Ok(DragOutcome::Ignored);
        };
        if surfaces.dispatch_widget_event(runtime.surface, event) {
            self.gesture = Gesture::Delegated {
                surface: runtime.surface,
            };
            return Ok(DragOutcome::Delegated);
        }
        self.gesture = Gesture::Armed {
            surface: runtime.surface,
            pointer: event.position,
            window: runtime.applied,
        };
        Ok(DragOutcome::Armed)
    }

    fn motion<S: OverlaySurface>(
        &mut self,
        event: &PointerEvent,
        surfaces: &mut S,
        registry: &InstanceRegistry,
    ) -> Result<DragOutcome, OverlayError> {
        match self.gesture {
            Gesture::Idle => Ok(DragOutcome::Ignored),
            Gesture::Delegated { surface } => {
                surfaces.dispatch_widget_event(surface, event);
                Ok(DragOutcome::Delegated)
            }
            Gesture::Armed {
                surface,
                pointer,
                window,
            } => {
                if event.position.manhattan(pointer) <= u32::from(self.slop) {
                    return Ok(DragOutcome::Armed);
                }
                self.gesture = Gesture::Dragging {
                    surface,
                    pointer,
                    window,
                    current: window,
                };
                self.drag_to(event.position, surfaces, registry)
            }
            Gesture::Dragging { .. } => self.drag_to(event.position, surfaces, registry),
        }
    }

    fn release<S: OverlaySurface>(
        &mut self,
        event: &PointerEvent,
        surfaces: &mut S,
        registry: &InstanceRegistry,
    ) -> Result<DragOutcome, OverlayError> {
        match self.gesture {
            Gesture::Idle => Ok(DragOutcome::Ignored),
            Gesture::Armed { .. } => {
                self.gesture = Gesture::Idle;
                Ok(DragOutcome::Released)
            }
            Gesture::Delegated { surface } => {
                self.gesture = Gesture::Idle;
                surfaces.dispatch_widget_event(surface, event);
                Ok(DragOutcome::Released)
            }
            Gesture::Dragging { .. } => {
                let moved = self.drag_to(event.position, surfaces, registry);
                let Gesture::Dragging { current, .. } = self.gesture else {
                    return moved;
                };
                self.gesture = Gesture::Idle;
                moved?;
                match registry.machine(self.id) {
                    Some(machine) => {
                        machine.update_geometry(current);
                        tracing::debug!(instance = %self.id, x = current.x, y = current.y, "drag committed");
                    }
                    None => {
                        tracing::debug!(instance = %self.id, "drag ended after instance was removed");
                    }
                }
                Ok(DragOutcome::Committed(current))
            }
        }
    }

    /// Abort the current gesture. A window drag snaps back to the last
    /// committed geometry.
    fn cancel<S: OverlaySurface>(
        &mut self,
        surfaces: &mut S,
        registry: &InstanceRegistry,
    ) -> Result<DragOutcome, OverlayError> {
        let gesture = std::mem::replace(&mut self.gesture, Gesture::Idle);
        match gesture {
            Gesture::Idle => Ok(DragOutcome::Ignored),
            Gesture::Armed { .. } => Ok(DragOutcome::Cancelled),
            Gesture::Delegated { surface } => {
                surfaces.dispatch_widget_event(surface, &PointerEvent::cancel());
                Ok(DragOutcome::Cancelled)
            }
            Gesture::Dragging {
                surface, current, ..
            } => {
                if let Some(committed) = registry.machine(self.id).map(|m| m.snapshot().geometry())
                    && committed != current
                {
                    self.apply(surface, committed, surfaces, registry)?;
                }
                Ok(DragOutcome::Cancelled)
            }
        }
    }

    fn drag_to<S: OverlaySurface>(
        &mut self,
        position: Point,
        surfaces: &mut S,
        registry: &InstanceRegistry,
    ) -> Result<DragOutcome, OverlayError> {
        let Gesture::Dragging {
            surface,
            pointer,
            window,
            current,
        } = self.gesture
        else {
            return Ok(DragOutcome::Ignored);
        };
        let mut next = window.with_origin(
            window.x + (position.x - pointer.x),
            window.y + (position.y - pointer.y),
        );
        if let Some(bounds) = self.bounds {
            next = next.clamp_to(bounds);
        }
        if next != current {
            if let Err(err) = self.apply(surface, next, surfaces, registry) {
                self.gesture = Gesture::Idle;
                return Err(err);
            }
            self.gesture = Gesture::Dragging {
                surface,
                pointer,
                window,
                current: next,
            };
        }
        Ok(DragOutcome::Moved(next))
    }

    fn apply<S: OverlaySurface>(
        &self,
        surface: SurfaceHandle,
        geometry: Geometry,
        surfaces: &mut S,
        registry: &InstanceRegistry,
    ) -> Result<(), OverlayError> {
        surfaces
            .update_geometry(surface, geometry)
            .map_err(|source| OverlayError::SurfaceAttach {
                id: self.id,
                source,
            })?;
        registry.set_applied_geometry(self.id, geometry);
        Ok(())
    }
}
