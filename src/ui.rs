//! UiFrame: a thin wrapper around `ratatui::Frame` that clips drawing to the
//! visible area.
//!
//! Overlay windows may sit partly off screen (negative origins, or dragged
//! past the right edge). Each window is drawn into its own offscreen buffer
//! and composited with [`UiFrame::blit_signed`], which drops the cells that
//! fall outside the frame instead of indexing out of bounds.
use ratatui::Frame;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;

/// Destination of a blit in signed screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedRect {
    pub x: i32,
    pub y: i32,
    pub width: u16,
    pub height: u16,
}

pub struct UiFrame<'a> {
    area: Rect,
    buffer: &'a mut Buffer,
}

impl<'a> UiFrame<'a> {
    pub fn new(frame: &'a mut Frame<'_>) -> Self {
        let area = frame.area();
        let buffer = frame.buffer_mut();
        Self { area, buffer }
    }

    pub fn from_parts(area: Rect, buffer: &'a mut Buffer) -> Self {
        Self { area, buffer }
    }

    /// Copy `src` (whose area starts at 0,0) to `dest`, skipping cells that
    /// land outside the frame.
    pub fn blit_signed(&mut self, src: &Buffer, dest: SignedRect) {
        let x0 = i32::from(self.area.x);
        let y0 = i32::from(self.area.y);
        let x1 = x0 + i32::from(self.area.width);
        let y1 = y0 + i32::from(self.area.height);
        for sy in 0..dest.height {
            let dy = dest.y + i32::from(sy);
            if dy < y0 || dy >= y1 {
                continue;
            }
            for sx in 0..dest.width {
                let dx = dest.x + i32::from(sx);
                if dx < x0 || dx >= x1 {
                    continue;
                }
                if let (Some(src_cell), Some(dst_cell)) = (
                    src.cell((sx, sy)),
                    self.buffer.cell_mut((dx as u16, dy as u16)),
                ) {
                    *dst_cell = src_cell.clone();
                }
            }
        }
    }
}
