use std::time::Instant;

use chrono::{DateTime, Local};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;

use super::widgets::{WidgetAction, WidgetState};
use super::{OverlaySurface, SurfaceHandle};
use crate::error::SurfaceError;
use crate::geometry::{Geometry, Point};
use crate::instance::{ContentKind, InstanceState};
use crate::pointer::{PointerEvent, PointerKind};
use crate::ui::{SignedRect, UiFrame};

/// Smallest window that still shows a border and one row of content.
const MIN_WIDTH: u16 = 8;
const MIN_HEIGHT: u16 = 3;

#[derive(Debug)]
struct TermWindow {
    handle: SurfaceHandle,
    geometry: Geometry,
    content: ContentKind,
    state: Option<InstanceState>,
    widget: WidgetState,
    pressed: Option<WidgetAction>,
}

impl TermWindow {
    fn size(&self) -> (u16, u16) {
        resolved_size(self.geometry, self.content)
    }

    fn contains(&self, point: Point) -> bool {
        let (w, h) = self.size();
        point.x >= self.geometry.x
            && point.y >= self.geometry.y
            && point.x < self.geometry.x + i32::from(w)
            && point.y < self.geometry.y + i32::from(h)
    }

    fn button_at(&self, point: Point) -> Option<WidgetAction> {
        let (_, h) = self.size();
        self.widget
            .button_at(point.x - self.geometry.x, point.y - self.geometry.y, h)
    }
}

fn resolved_size(geometry: Geometry, content: ContentKind) -> (u16, u16) {
    let (pw, ph) = content.preferred_size();
    let clamp = |v: u32| v.min(u32::from(u16::MAX)) as u16;
    (
        clamp(geometry.width.resolve(pw)),
        clamp(geometry.height.resolve(ph)),
    )
}

/// Overlay windows drawn as floating boxes in the terminal.
///
/// Windows are kept in z-order (last is topmost). Pressing a window raises
/// it. Widgets claim presses on their button row.
#[derive(Debug, Default)]
pub struct TerminalSurfaces {
    next_handle: u64,
    windows: Vec<TermWindow>,
}

impl TerminalSurfaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topmost(&self) -> Option<SurfaceHandle> {
        self.windows.last().map(|w| w.handle)
    }

    /// Advance countdowns. Returns `true` if one finished with sound on.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut ring = false;
        for window in &mut self.windows {
            if let Some(state) = &window.state {
                ring |= window.widget.tick(state, now);
            }
        }
        ring
    }

    pub fn render(&self, frame: &mut UiFrame<'_>, clock: DateTime<Local>, now: Instant) {
        for window in &self.windows {
            let Some(state) = &window.state else {
                continue;
            };
            let (width, height) = window.size();
            let area = Rect::new(0, 0, width, height);
            let mut buf = Buffer::empty(area);
            window.widget.render(state, area, &mut buf, clock, now);
            frame.blit_signed(
                &buf,
                SignedRect {
                    x: window.geometry.x,
                    y: window.geometry.y,
                    width,
                    height,
                },
            );
        }
    }

    fn index_of(&self, handle: SurfaceHandle) -> Result<usize, SurfaceError> {
        self.windows
            .iter()
            .position(|w| w.handle == handle)
            .ok_or(SurfaceError::UnknownSurface(handle))
    }

    fn raise(&mut self, index: usize) -> usize {
        let window = self.windows.remove(index);
        self.windows.push(window);
        self.windows.len() - 1
    }
}

impl OverlaySurface for TerminalSurfaces {
    fn create(
        &mut self,
        geometry: Geometry,
        content: ContentKind,
    ) -> Result<SurfaceHandle, SurfaceError> {
        let (width, height) = resolved_size(geometry, content);
        if width < MIN_WIDTH || height < MIN_HEIGHT {
            return Err(SurfaceError::Rejected(format!(
                "{width}x{height} is smaller than {MIN_WIDTH}x{MIN_HEIGHT}"
            )));
        }
        self.next_handle += 1;
        let handle = SurfaceHandle(self.next_handle);
        self.windows.push(TermWindow {
            handle,
            geometry,
            content,
            state: None,
            widget: WidgetState::for_content(content),
            pressed: None,
        });
        Ok(handle)
    }

    fn update_geometry(
        &mut self,
        handle: SurfaceHandle,
        geometry: Geometry,
    ) -> Result<(), SurfaceError> {
        let index = self.index_of(handle)?;
        let (width, height) = resolved_size(geometry, self.windows[index].content);
        if width < MIN_WIDTH || height < MIN_HEIGHT {
            return Err(SurfaceError::Rejected(format!(
                "cannot shrink to {width}x{height}"
            )));
        }
        self.windows[index].geometry = geometry;
        Ok(())
    }

    fn update_content(
        &mut self,
        handle: SurfaceHandle,
        state: &InstanceState,
    ) -> Result<(), SurfaceError> {
        let index = self.index_of(handle)?;
        self.windows[index].state = Some(state.clone());
        Ok(())
    }

    fn destroy(&mut self, handle: SurfaceHandle) -> Result<(), SurfaceError> {
        let index = self.index_of(handle)?;
        self.windows.remove(index);
        Ok(())
    }

    fn dispatch_widget_event(&mut self, handle: SurfaceHandle, event: &PointerEvent) -> bool {
        let Ok(mut index) = self.index_of(handle) else {
            return false;
        };
        match event.kind {
            PointerKind::Down => {
                index = self.raise(index);
                let window = &mut self.windows[index];
                window.pressed = window.button_at(event.position);
                window.pressed.is_some()
            }
            PointerKind::Move => false,
            PointerKind::Up => {
                let window = &mut self.windows[index];
                let Some(pressed) = window.pressed.take() else {
                    return false;
                };
                if window.button_at(event.position) == Some(pressed)
                    && let Some(state) = &window.state
                {
                    window.widget.perform(pressed, state, Instant::now());
                }
                true
            }
            PointerKind::Cancel => {
                self.windows[index].pressed = None;
                false
            }
        }
    }

    fn surface_at(&self, point: Point) -> Option<SurfaceHandle> {
        self.windows
            .iter()
            .rev()
            .find(|w| w.contains(point))
            .map(|w| w.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Extent;
    use crate::instance::{InstanceId, Mode};

    fn dice_state() -> InstanceState {
        InstanceState::new(InstanceId::new(2).unwrap(), Mode::Dice, Geometry::auto_at(4, 2))
    }

    #[test]
    fn tiny_fixed_size_is_rejected() {
        let mut surfaces = TerminalSurfaces::new();
        let geometry = Geometry {
            width: Extent::Fixed(3),
            ..Geometry::default()
        };
        assert!(matches!(
            surfaces.create(geometry, ContentKind::CoinFlip),
            Err(SurfaceError::Rejected(_))
        ));
    }

    #[test]
    fn press_raises_and_button_claims() {
        let mut surfaces = TerminalSurfaces::new();
        let state = dice_state();
        let dice = surfaces.create(state.geometry(), ContentKind::DiceTray).unwrap();
        surfaces.update_content(dice, &state).unwrap();
        let coin = surfaces.create(Geometry::auto_at(30, 0), ContentKind::CoinFlip).unwrap();
        assert_eq!(surfaces.topmost(), Some(coin));

        // body of the dice window: raised, not claimed
        assert!(!surfaces.dispatch_widget_event(dice, &PointerEvent::down(6, 3)));
        assert_eq!(surfaces.topmost(), Some(dice));

        // "[roll]" starts one column inside the border on the last inner row
        assert!(surfaces.dispatch_widget_event(dice, &PointerEvent::down(5, 5)));
        assert!(surfaces.dispatch_widget_event(dice, &PointerEvent::up(5, 5)));
        let window = &surfaces.windows[surfaces.index_of(dice).unwrap()];
        assert!(matches!(&window.widget, WidgetState::Dice { faces } if faces.len() == 2));
    }

    #[test]
    fn render_composites_partly_offscreen_window() {
        let mut surfaces = TerminalSurfaces::new();
        let mut state = dice_state();
        state.window_x = -3;
        let handle = surfaces.create(state.geometry(), ContentKind::DiceTray).unwrap();
        surfaces.update_content(handle, &state).unwrap();
        let area = Rect::new(0, 0, 40, 10);
        let mut buf = Buffer::empty(area);
        let mut frame = UiFrame::from_parts(area, &mut buf);
        surfaces.render(&mut frame, Local::now(), Instant::now());
        assert_ne!(buf.cell((0, 2)).unwrap().symbol(), " ");
        assert_eq!(surfaces.surface_at(Point::new(0, 3)), Some(handle));
    }
}
