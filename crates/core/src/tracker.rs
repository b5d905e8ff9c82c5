//! In-flight frame bookkeeping and ordered reassembly.
//!
//! Strips may arrive in any order; the tracker keys them by `row_start`
//! and assembles the frame top to bottom once every expected strip is in.
//! Strips for frames that are no longer pending are dropped silently.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::time::{Duration, Instant};

use crate::error::CoreError;
use crate::frame::{AssembledFrame, Frame, Strip};
use crate::registry::WorkerRegistry;
use crate::types::{FrameId, WorkerId};

/// Bookkeeping for one requested frame.
#[derive(Debug)]
struct PendingFrame {
    frame: Frame,
    /// Expected strips: `row_start -> row_end`.
    expected: BTreeMap<u32, u32>,
    received: BTreeMap<u32, Strip>,
    requested_at: Instant,
    deadline: Option<Instant>,
}

/// What happened to a strip that was not a protocol violation.
#[derive(Debug, PartialEq)]
pub enum StripOutcome {
    /// The frame is still waiting on other strips.
    Pending { received: usize, expected: usize },
    /// This was the last strip; the frame is assembled and no longer tracked.
    Completed(AssembledFrame),
    /// The frame had already completed or been discarded.
    Dropped,
}

/// Pending frames, keyed by frame id.
#[derive(Debug, Default)]
pub struct FrameTracker {
    pending: HashMap<FrameId, PendingFrame>,
}

impl FrameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames currently in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, frame_id: FrameId) -> bool {
        self.pending.contains_key(&frame_id)
    }

    /// Strips received so far for a pending frame.
    pub fn received_count(&self, frame_id: FrameId) -> Option<usize> {
        self.pending.get(&frame_id).map(|p| p.received.len())
    }

    /// Start tracking `frame`, expecting exactly the given row ranges.
    ///
    /// `ttl` is the reclaim deadline; `None` keeps the frame until it
    /// completes. Does nothing if `strips` is empty.
    pub fn begin_frame<I>(&mut self, frame: Frame, strips: I, ttl: Option<Duration>)
    where
        I: IntoIterator<Item = Range<u32>>,
    {
        let expected: BTreeMap<u32, u32> = strips.into_iter().map(|r| (r.start, r.end)).collect();
        if expected.is_empty() {
            return;
        }

        let requested_at = Instant::now();
        self.pending.insert(
            frame.id,
            PendingFrame {
                frame,
                expected,
                received: BTreeMap::new(),
                requested_at,
                deadline: ttl.map(|d| requested_at + d),
            },
        );
    }

    /// Record a strip delivered by `worker_id`.
    ///
    /// Clears the worker's busy flag first. Returns `Err` for protocol
    /// violations (duplicate, unexpected or malformed strip); the strip is
    /// discarded and the frame's progress is unchanged.
    pub fn on_strip_arrived<H>(
        &mut self,
        registry: &mut WorkerRegistry<H>,
        worker_id: WorkerId,
        strip: Strip,
    ) -> Result<StripOutcome, CoreError> {
        registry.clear_busy(worker_id);

        let frame_id = strip.frame_id;
        let Some(pending) = self.pending.get_mut(&frame_id) else {
            return Ok(StripOutcome::Dropped);
        };

        validate_strip(pending, &strip)?;
        pending.received.insert(strip.row_start, strip);

        let received = pending.received.len();
        let expected = pending.expected.len();
        if received < expected {
            return Ok(StripOutcome::Pending { received, expected });
        }

        match self.pending.remove(&frame_id) {
            Some(done) => Ok(StripOutcome::Completed(assemble(done))),
            None => Err(CoreError::Internal(format!(
                "Frame {frame_id} vanished during assembly"
            ))),
        }
    }

    /// A worker reported an error instead of a strip.
    ///
    /// Clears its busy flag and returns the frame it owed. The frame's
    /// expected count is left untouched, so that frame can only finish by
    /// being reclaimed through [`discard_expired`](Self::discard_expired).
    pub fn on_strip_error<H>(
        &mut self,
        registry: &mut WorkerRegistry<H>,
        worker_id: WorkerId,
    ) -> Option<FrameId> {
        let owed = registry.clear_busy(worker_id)?;
        Some(owed.frame_id)
    }

    /// Force-discard every pending frame whose deadline has passed.
    /// Returns the discarded ids in ascending order.
    pub fn discard_expired(&mut self, now: Instant) -> Vec<FrameId> {
        let mut expired: Vec<FrameId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline.is_some_and(|d| now >= d))
            .map(|(id, _)| *id)
            .collect();
        expired.sort_unstable();

        for id in &expired {
            self.pending.remove(id);
        }
        expired
    }

    /// Drop all pending frames without delivering them. Returns how many
    /// were discarded.
    pub fn discard_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}

fn validate_strip(pending: &PendingFrame, strip: &Strip) -> Result<(), CoreError> {
    let frame_id = pending.frame.id;

    if pending.received.contains_key(&strip.row_start) {
        return Err(CoreError::Protocol(format!(
            "Duplicate strip for frame {frame_id} at row {}",
            strip.row_start
        )));
    }

    match pending.expected.get(&strip.row_start) {
        None => {
            return Err(CoreError::Protocol(format!(
                "Frame {frame_id} has no strip starting at row {}",
                strip.row_start
            )));
        }
        Some(&row_end) if row_end != strip.row_end => {
            return Err(CoreError::Protocol(format!(
                "Strip for frame {frame_id} at row {} ends at {}, expected {row_end}",
                strip.row_start, strip.row_end
            )));
        }
        Some(_) => {}
    }

    let want = pending.frame.strip_bytes(&strip.rows());
    if strip.pixels.len() != want {
        return Err(CoreError::Protocol(format!(
            "Strip for frame {frame_id} rows {}..{} carries {} bytes, expected {want}",
            strip.row_start,
            strip.row_end,
            strip.pixels.len()
        )));
    }

    Ok(())
}

/// Concatenate strips in ascending `row_start` order.
fn assemble(done: PendingFrame) -> AssembledFrame {
    let mut pixels = Vec::with_capacity(done.frame.frame_bytes());
    for strip in done.received.into_values() {
        pixels.extend_from_slice(&strip.pixels);
    }

    AssembledFrame {
        frame: done.frame,
        pixels,
        elapsed: done.requested_at.elapsed(),
    }
}
