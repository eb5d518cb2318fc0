use crossterm::event::{MouseButton, MouseEvent, MouseEventKind};

use crate::geometry::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Move,
    Up,
    /// The system took the gesture away (focus loss, capture released, ...).
    Cancel,
}

/// A primary-button pointer event in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub position: Point,
}

impl PointerEvent {
    pub fn new(kind: PointerKind, x: i32, y: i32) -> Self {
        Self {
            kind,
            position: Point::new(x, y),
        }
    }

    pub fn down(x: i32, y: i32) -> Self {
        Self::new(PointerKind::Down, x, y)
    }

    pub fn moved(x: i32, y: i32) -> Self {
        Self::new(PointerKind::Move, x, y)
    }

    pub fn up(x: i32, y: i32) -> Self {
        Self::new(PointerKind::Up, x, y)
    }

    pub fn cancel() -> Self {
        Self::new(PointerKind::Cancel, 0, 0)
    }

    /// Translate a terminal mouse event. Only the left button takes part in
    /// gestures; hover, scroll and other buttons yield `None`.
    pub fn from_mouse(mouse: &MouseEvent) -> Option<Self> {
        let kind = match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => PointerKind::Down,
            MouseEventKind::Drag(MouseButton::Left) => PointerKind::Move,
            MouseEventKind::Up(MouseButton::Left) => PointerKind::Up,
            _ => return None,
        };
        Some(Self::new(kind, i32::from(mouse.column), i32::from(mouse.row)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn mouse(kind: MouseEventKind) -> MouseEvent {
        MouseEvent {
            kind,
            column: 7,
            row: 3,
            modifiers: KeyModifiers::NONE,
        }
    }

    #[test]
    fn left_button_maps_to_gesture_events() {
        let down = PointerEvent::from_mouse(&mouse(MouseEventKind::Down(MouseButton::Left)));
        assert_eq!(down, Some(PointerEvent::down(7, 3)));
        let drag = PointerEvent::from_mouse(&mouse(MouseEventKind::Drag(MouseButton::Left)));
        assert_eq!(drag.map(|e| e.kind), Some(PointerKind::Move));
    }

    #[test]
    fn other_mouse_activity_is_ignored() {
        assert!(PointerEvent::from_mouse(&mouse(MouseEventKind::Moved)).is_none());
        assert!(PointerEvent::from_mouse(&mouse(MouseEventKind::Down(MouseButton::Right))).is_none());
        assert!(PointerEvent::from_mouse(&mouse(MouseEventKind::ScrollUp)).is_none());
    }
}
