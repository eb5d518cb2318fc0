use crate::constants::{CASCADE_STEP, DRAG_SLOP, MAX_INSTANCES};
use crate::geometry::{Bounds, Geometry};
use crate::instance::Mode;

/// Tunables for one [`LifecycleCoordinator`](crate::lifecycle::LifecycleCoordinator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    pub max_instances: usize,
    pub drag_slop: u16,
    pub default_mode: Mode,
    /// Screen area. When set, restored windows are clamped into it and drags
    /// cannot push a window's origin off the top or left edge.
    pub screen: Option<Bounds>,
    pub cascade_step: i32,
    /// Whether this coordinator owns the `live_count` scalar. Off for
    /// processes that only apply a command next to a running host.
    pub report_live_count: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_instances: MAX_INSTANCES,
            drag_slop: DRAG_SLOP,
            default_mode: Mode::Digital,
            screen: None,
            cascade_step: CASCADE_STEP,
            report_live_count: true,
        }
    }
}

impl ManagerConfig {
    pub fn with_screen(mut self, screen: Bounds) -> Self {
        self.screen = Some(screen);
        self
    }

    pub fn with_max_instances(mut self, max: usize) -> Self {
        self.max_instances = max.max(1);
        self
    }

    pub fn without_live_count(mut self) -> Self {
        self.report_live_count = false;
        self
    }

    /// Initial geometry for the `slot`-th window of a session.
    pub fn cascade(&self, slot: usize) -> Geometry {
        let offset = self.cascade_step.saturating_mul(slot as i32);
        let geometry = Geometry::auto_at(offset, offset);
        match self.screen {
            Some(bounds) => geometry.clamp_to(bounds),
            None => geometry,
        }
    }

    pub fn restore_geometry(&self, geometry: Geometry) -> Geometry {
        match self.screen {
            Some(bounds) => geometry.clamp_to(bounds),
            None => geometry,
        }
    }
}
