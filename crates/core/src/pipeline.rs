//! In-flight frame bound.

/// Default number of frames allowed in flight at once.
pub const DEFAULT_PIPELINE_DEPTH: usize = 2;

/// Admission control for new frames.
///
/// A new frame may be requested only while fewer than `depth` frames are
/// pending. This bounds assembly memory and stops the scheduler from
/// flooding workers that have fallen behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineGovernor {
    depth: usize,
}

impl PipelineGovernor {
    /// Create a governor. A depth of zero is raised to one so the pipeline
    /// can always make progress.
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether another frame may be started with `in_flight` frames pending.
    pub fn admits(&self, in_flight: usize) -> bool {
        in_flight < self.depth
    }
}

impl Default for PipelineGovernor {
    fn default() -> Self {
        Self::new(DEFAULT_PIPELINE_DEPTH)
    }
}
