//! Frame, viewport, and strip value types.

use std::ops::Range;
use std::time::Duration;

use serde::Serialize;

use crate::types::{FrameId, BYTES_PER_PIXEL};

/// Viewport parameters captured at the moment a frame is requested.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub center_x: f64,
    pub center_y: f64,
    pub zoom: f64,
    pub max_iterations: u32,
}

/// One requested frame. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Frame {
    pub id: FrameId,
    pub width: u32,
    pub height: u32,
    pub viewport: Viewport,
}

impl Frame {
    /// Size of one RGB row in bytes.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Expected payload size for the half-open row range.
    pub fn strip_bytes(&self, rows: &Range<u32>) -> usize {
        rows.end.saturating_sub(rows.start) as usize * self.row_bytes()
    }

    /// Size of the fully assembled frame in bytes.
    pub fn frame_bytes(&self) -> usize {
        self.height as usize * self.row_bytes()
    }
}

/// A rendered horizontal band of one frame, rows `[row_start, row_end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Strip {
    pub frame_id: FrameId,
    pub row_start: u32,
    pub row_end: u32,
    /// Row-major RGB pixels.
    pub pixels: Vec<u8>,
}

impl Strip {
    pub fn rows(&self) -> Range<u32> {
        self.row_start..self.row_end
    }
}

/// A completed frame ready for the rendering surface.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledFrame {
    pub frame: Frame,
    /// Row-major RGB pixels covering `[0, frame.height)`.
    pub pixels: Vec<u8>,
    /// Wall time between the request and the final strip arriving.
    pub elapsed: Duration,
}
