//! Continuous zoom state.

use serde::Serialize;

use crate::error::CoreError;
use crate::frame::Viewport;

/// Extra iterations granted per doubling of the zoom factor.
pub const ITERATIONS_PER_ZOOM_DOUBLING: f64 = 32.0;

/// Deepest zoom factor the state will reach. Kept well inside `f64` range
/// so a viewport always serializes as a finite number.
pub const MAX_ZOOM: f64 = 1e300;

/// Zoom progression parameters and current position.
///
/// Advanced exactly once per requested frame and never rolled back, so the
/// zoom factor is strictly increasing across requests until it reaches
/// [`MAX_ZOOM`], where it holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoomState {
    center_x: f64,
    center_y: f64,
    zoom: f64,
    growth: f64,
    base_iterations: u32,
    iteration_ceiling: u32,
    max_iterations: u32,
}

impl ZoomState {
    /// Start a zoom at factor 1.0.
    ///
    /// `growth` must be finite and greater than 1; `iteration_ceiling` must
    /// not be below `base_iterations`.
    pub fn new(
        center_x: f64,
        center_y: f64,
        growth: f64,
        base_iterations: u32,
        iteration_ceiling: u32,
    ) -> Result<Self, CoreError> {
        if !growth.is_finite() || growth <= 1.0 {
            return Err(CoreError::Validation(format!(
                "Zoom growth must be greater than 1, got {growth}"
            )));
        }
        if base_iterations == 0 {
            return Err(CoreError::Validation(
                "Base iteration cap must be positive".to_string(),
            ));
        }
        if iteration_ceiling < base_iterations {
            return Err(CoreError::Validation(format!(
                "Iteration ceiling {iteration_ceiling} is below the base cap {base_iterations}"
            )));
        }

        let mut state = Self {
            center_x,
            center_y,
            zoom: 1.0,
            growth,
            base_iterations,
            iteration_ceiling,
            max_iterations: base_iterations,
        };
        state.max_iterations = state.iterations_for(state.zoom);
        Ok(state)
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// True once the zoom has reached [`MAX_ZOOM`] and no longer grows.
    pub fn is_saturated(&self) -> bool {
        self.zoom >= MAX_ZOOM
    }

    /// Viewport parameters for a frame requested right now.
    pub fn snapshot(&self) -> Viewport {
        Viewport {
            center_x: self.center_x,
            center_y: self.center_y,
            zoom: self.zoom,
            max_iterations: self.max_iterations,
        }
    }

    /// Move one frame deeper, stopping at [`MAX_ZOOM`].
    pub fn advance(&mut self) {
        self.zoom = (self.zoom * self.growth).min(MAX_ZOOM);
        self.max_iterations = self.iterations_for(self.zoom);
    }

    /// Iteration cap as a function of zoom: grows with `log2(zoom)`, never
    /// drops below the base and never exceeds the ceiling.
    fn iterations_for(&self, zoom: f64) -> u32 {
        let doublings = zoom.max(1.0).log2();
        let cap = self.base_iterations as f64 + ITERATIONS_PER_ZOOM_DOUBLING * doublings;
        cap.min(self.iteration_ceiling as f64) as u32
    }
}
