use serde::{Deserialize, Serialize};

use crate::constants::{AUTO_SIZE, MIN_VISIBLE_MARGIN};

/// One window dimension: either a fixed size or "size from content".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Extent {
    Auto,
    Fixed(u32),
}

impl Extent {
    pub fn resolve(self, preferred: u32) -> u32 {
        match self {
            Extent::Auto => preferred,
            Extent::Fixed(value) => value,
        }
    }
}

impl From<Extent> for i64 {
    fn from(extent: Extent) -> Self {
        match extent {
            Extent::Auto => AUTO_SIZE,
            Extent::Fixed(value) => i64::from(value),
        }
    }
}

impl TryFrom<i64> for Extent {
    type Error = String;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        if raw == AUTO_SIZE {
            return Ok(Extent::Auto);
        }
        match u32::try_from(raw) {
            Ok(value) if value > 0 => Ok(Extent::Fixed(value)),
            _ => Err(format!("window extent must be positive or {AUTO_SIZE}, got {raw}")),
        }
    }
}

/// Window origin and size as the state machine sees it.
///
/// Origins are signed so a window that was dragged partially off the top or
/// left edge keeps its true position instead of snapping to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: Extent,
    pub height: Extent,
}

impl Default for Geometry {
    fn default() -> Self {
        Self::auto_at(0, 0)
    }
}

impl Geometry {
    pub fn auto_at(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            width: Extent::Auto,
            height: Extent::Auto,
        }
    }

    pub fn with_origin(self, x: i32, y: i32) -> Self {
        Self { x, y, ..self }
    }

    /// Pull the origin back so at least [`MIN_VISIBLE_MARGIN`] units of the
    /// window remain on screen. Sizes are left untouched.
    pub fn clamp_to(self, bounds: Bounds) -> Self {
        let margin = i32::from(MIN_VISIBLE_MARGIN);
        let max_x = (bounds.width as i32 - margin).max(0);
        let max_y = (bounds.height as i32 - margin).max(0);
        Self {
            x: self.x.clamp(0, max_x),
            y: self.y.clamp(0, max_y),
            ..self
        }
    }
}

/// Visible screen (or terminal) area that overlays live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Pointer location in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(self, other: Point) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_sentinel_round_trips_through_i64() {
        assert_eq!(i64::from(Extent::Auto), AUTO_SIZE);
        assert_eq!(Extent::try_from(AUTO_SIZE), Ok(Extent::Auto));
        assert_eq!(Extent::try_from(120), Ok(Extent::Fixed(120)));
        assert!(Extent::try_from(0).is_err());
        assert!(Extent::try_from(-7).is_err());
    }

    #[test]
    fn clamp_keeps_margin_visible() {
        let bounds = Bounds::new(80, 24);
        let g = Geometry::auto_at(200, -5).clamp_to(bounds);
        assert_eq!(g.x, 80 - i32::from(MIN_VISIBLE_MARGIN));
        assert_eq!(g.y, 0);
        assert_eq!(g.width, Extent::Auto);
    }

    #[test]
    fn clamp_on_tiny_screen_pins_to_origin() {
        let g = Geometry::auto_at(3, 3).clamp_to(Bounds::new(2, 2));
        assert_eq!((g.x, g.y), (0, 0));
    }
}
