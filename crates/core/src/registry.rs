//! Worker registry and per-worker connection state machine.
//!
//! The registry exclusively owns the worker records. It is the only writer
//! of connection state; the scheduler marks workers busy on dispatch and
//! the frame tracker clears busy when a strip (or an error) comes back.
//!
//! ```text
//!   Disconnected --connect attempt--> Connecting --success--> Idle
//!   Connecting --timeout/error--> Disconnected
//!   Idle --dispatch--> Busy --strip/error--> Idle
//!   Idle | Busy --drop--> Disconnected
//! ```
//!
//! The registry is generic over the connection handle `H` so this crate
//! stays free of any transport.

use serde::Serialize;

use crate::capability::{normalize, DEFAULT_CAPABILITY};
use crate::types::{FrameId, Timestamp, WorkerId};

/// Lifecycle state of one worker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// A connection attempt is in progress.
    Connecting,
    /// Connected and waiting for work.
    Idle,
    /// Connected and rendering the strip starting at `row_start` of `frame_id`.
    Busy { frame_id: FrameId, row_start: u32 },
    /// Not connected; a reconnect is pending.
    Disconnected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Idle | Self::Busy { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// The strip a busy worker owes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwedStrip {
    pub frame_id: FrameId,
    pub row_start: u32,
}

/// One managed worker slot.
#[derive(Debug)]
pub struct WorkerRecord<H> {
    pub id: WorkerId,
    pub endpoint: String,
    state: ConnectionState,
    handle: Option<H>,
    raw_capability: f64,
    weight: f64,
    connected_at: Option<Timestamp>,
}

impl<H> WorkerRecord<H> {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    /// Un-normalized throughput estimate.
    pub fn raw_capability(&self) -> f64 {
        self.raw_capability
    }

    /// Normalized capability weight over the current connected set
    /// (zero while disconnected).
    pub fn weight(&self) -> f64 {
        self.weight
    }
}

/// Read-only view of one worker for status display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerSnapshot {
    pub id: WorkerId,
    pub endpoint: String,
    pub state: ConnectionState,
    pub raw_capability: f64,
    pub weight: f64,
    pub connected_at: Option<Timestamp>,
}

/// Fixed-size pool of worker records indexed by [`WorkerId`].
#[derive(Debug)]
pub struct WorkerRegistry<H> {
    workers: Vec<WorkerRecord<H>>,
}

impl<H> WorkerRegistry<H> {
    /// Create `target_count` worker slots, assigning endpoints round-robin
    /// by worker index. All workers start disconnected.
    ///
    /// Returns an empty registry if `endpoints` is empty.
    pub fn new(target_count: usize, endpoints: &[String]) -> Self {
        if endpoints.is_empty() {
            return Self {
                workers: Vec::new(),
            };
        }

        let workers = (0..target_count)
            .map(|i| WorkerRecord {
                id: WorkerId(i),
                endpoint: endpoints[i % endpoints.len()].clone(),
                state: ConnectionState::Disconnected,
                handle: None,
                raw_capability: DEFAULT_CAPABILITY,
                weight: 0.0,
                connected_at: None,
            })
            .collect();

        Self { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn get(&self, id: WorkerId) -> Option<&WorkerRecord<H>> {
        self.workers.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerRecord<H>> {
        self.workers.iter()
    }

    /// Connection handle of a connected worker.
    pub fn handle(&self, id: WorkerId) -> Option<&H> {
        self.get(id).and_then(|w| w.handle.as_ref())
    }

    pub fn connected_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_connected()).count()
    }

    pub fn busy_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_busy()).count()
    }

    /// Connected handles, index-ascending.
    pub fn connected_handles(&self) -> Vec<(WorkerId, &H)> {
        self.workers
            .iter()
            .filter(|w| w.is_connected())
            .filter_map(|w| w.handle.as_ref().map(|h| (w.id, h)))
            .collect()
    }

    /// Workers eligible for this tick's partition: connected and idle,
    /// index-ascending, paired with their normalized weight.
    pub fn idle_connected(&self) -> Vec<(WorkerId, f64)> {
        self.workers
            .iter()
            .filter(|w| w.state == ConnectionState::Idle)
            .map(|w| (w.id, w.weight))
            .collect()
    }

    /// Workers still busy with a strip of `frame_id`, index-ascending.
    pub fn owing(&self, frame_id: FrameId) -> Vec<WorkerId> {
        self.workers
            .iter()
            .filter(|w| matches!(w.state, ConnectionState::Busy { frame_id: f, .. } if f == frame_id))
            .map(|w| w.id)
            .collect()
    }

    // ---- connection lifecycle ----

    /// A connection attempt has started.
    pub fn mark_connecting(&mut self, id: WorkerId) {
        if let Some(w) = self.workers.get_mut(id.0) {
            if !w.is_connected() {
                w.state = ConnectionState::Connecting;
            }
        }
    }

    /// The connection attempt failed; the worker stays unconnected.
    pub fn mark_connect_failed(&mut self, id: WorkerId) {
        if let Some(w) = self.workers.get_mut(id.0) {
            if w.state == ConnectionState::Connecting {
                w.state = ConnectionState::Disconnected;
            }
        }
    }

    /// The worker connected: idle, default capability until benchmarked.
    pub fn mark_connected(&mut self, id: WorkerId, handle: H) {
        let Some(w) = self.workers.get_mut(id.0) else {
            return;
        };
        w.state = ConnectionState::Idle;
        w.handle = Some(handle);
        w.raw_capability = DEFAULT_CAPABILITY;
        w.connected_at = Some(chrono::Utc::now());
        self.renormalize();
    }

    /// The connection dropped. Returns the strip the worker still owed, if
    /// it was busy; that strip will never be delivered.
    pub fn mark_disconnected(&mut self, id: WorkerId) -> Option<OwedStrip> {
        let w = self.workers.get_mut(id.0)?;
        let owed = owed_strip(w.state);
        w.state = ConnectionState::Disconnected;
        w.handle = None;
        w.connected_at = None;
        self.renormalize();
        owed
    }

    // ---- busy flag ----

    /// Mark an idle worker busy with one strip. Returns `false` (and
    /// changes nothing) if the worker is not idle.
    pub fn mark_busy(&mut self, id: WorkerId, frame_id: FrameId, row_start: u32) -> bool {
        match self.workers.get_mut(id.0) {
            Some(w) if w.state == ConnectionState::Idle => {
                w.state = ConnectionState::Busy {
                    frame_id,
                    row_start,
                };
                true
            }
            _ => false,
        }
    }

    /// Return a busy worker to idle, yielding the strip it owed.
    pub fn clear_busy(&mut self, id: WorkerId) -> Option<OwedStrip> {
        let w = self.workers.get_mut(id.0)?;
        let owed = owed_strip(w.state);
        if owed.is_some() {
            w.state = ConnectionState::Idle;
        }
        owed
    }

    // ---- capability ----

    /// Store a freshly measured raw capability and renormalize. Ignored for
    /// workers that are no longer connected (the sample belongs to a
    /// previous connection cycle). Returns whether it was applied.
    pub fn record_capability(&mut self, id: WorkerId, raw: f64) -> bool {
        match self.workers.get_mut(id.0) {
            Some(w) if w.is_connected() => {
                w.raw_capability = raw;
                self.renormalize();
                true
            }
            _ => false,
        }
    }

    /// Recompute normalized weights over the connected set. Disconnected
    /// workers get weight zero.
    fn renormalize(&mut self) {
        let connected: Vec<usize> = self
            .workers
            .iter()
            .enumerate()
            .filter(|(_, w)| w.is_connected())
            .map(|(i, _)| i)
            .collect();
        let raw: Vec<f64> = connected
            .iter()
            .map(|&i| self.workers[i].raw_capability)
            .collect();
        let weights = normalize(&raw);

        for w in &mut self.workers {
            w.weight = 0.0;
        }
        for (i, weight) in connected.into_iter().zip(weights) {
            self.workers[i].weight = weight;
        }
    }

    /// Sum of normalized weights over connected workers (1.0 whenever at
    /// least one worker is connected).
    pub fn weight_sum(&self) -> f64 {
        self.workers
            .iter()
            .filter(|w| w.is_connected())
            .map(|w| w.weight)
            .sum()
    }

    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        self.workers
            .iter()
            .map(|w| WorkerSnapshot {
                id: w.id,
                endpoint: w.endpoint.clone(),
                state: w.state,
                raw_capability: w.raw_capability,
                weight: w.weight,
                connected_at: w.connected_at,
            })
            .collect()
    }

    /// Drop every handle and mark all workers disconnected.
    pub fn disconnect_all(&mut self) {
        for w in &mut self.workers {
            w.state = ConnectionState::Disconnected;
            w.handle = None;
            w.weight = 0.0;
            w.connected_at = None;
        }
    }
}

fn owed_strip(state: ConnectionState) -> Option<OwedStrip> {
    match state {
        ConnectionState::Busy {
            frame_id,
            row_start,
        } => Some(OwedStrip {
            frame_id,
            row_start,
        }),
        _ => None,
    }
}
