//! Pure scheduling and frame-assembly logic for the zoomfarm coordinator.
//!
//! Nothing in this crate performs I/O. The async plumbing that talks to
//! remote render workers lives in `zoomfarm-workers`; the scheduler loop
//! that drives everything lives in `zoomfarm-coordinator`.

pub mod capability;
pub mod error;
pub mod frame;
pub mod partition;
pub mod pipeline;
pub mod registry;
pub mod tracker;
pub mod types;
pub mod zoom;
