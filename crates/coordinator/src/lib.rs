//! Coordinator for a distributed fractal zoom.
//!
//! The [`scheduler::Scheduler`] keeps a pool of render workers busy: every
//! tick it splits the next frame into horizontal strips sized by each idle
//! worker's measured capability, sends them out, and reassembles the
//! strips that come back into complete frames for a [`sink::FrameSink`].

pub mod config;
pub mod scheduler;
pub mod sink;
pub mod status;
