//! Scheduler counters published for observers.

use serde::Serialize;
use tokio::sync::watch;
use zoomfarm_core::registry::WorkerSnapshot;
use zoomfarm_core::types::Timestamp;

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub started_at: Timestamp,
    pub connected_workers: usize,
    pub frames_requested: u64,
    pub frames_completed: u64,
    pub frames_discarded: u64,
    pub strips_rejected: u64,
    /// Render requests a worker answered with an error.
    pub strip_errors: u64,
    /// Connections dropped because the worker never delivered a strip of
    /// a reclaimed frame.
    pub workers_released: u64,
    pub in_flight: usize,
    pub zoom: f64,
    pub max_iterations: u32,
    /// Refreshed when a worker connects, disconnects or is benchmarked.
    pub workers: Vec<WorkerSnapshot>,
}

impl StatusSnapshot {
    pub fn new(started_at: Timestamp, zoom: f64, max_iterations: u32) -> Self {
        Self {
            started_at,
            connected_workers: 0,
            frames_requested: 0,
            frames_completed: 0,
            frames_discarded: 0,
            strips_rejected: 0,
            strip_errors: 0,
            workers_released: 0,
            in_flight: 0,
            zoom,
            max_iterations,
            workers: Vec::new(),
        }
    }

    /// Completed frames per second since start.
    pub fn frame_rate(&self, now: Timestamp) -> f64 {
        let secs = (now - self.started_at).num_milliseconds() as f64 / 1000.0;
        if secs <= 0.0 {
            0.0
        } else {
            self.frames_completed as f64 / secs
        }
    }
}

pub type StatusReceiver = watch::Receiver<StatusSnapshot>;

/// Log a status line every time `interval` elapses, until the sender
/// is dropped.
pub async fn log_status(mut rx: StatusReceiver, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if rx.has_changed().is_err() {
            break;
        }

        let status = rx.borrow_and_update().clone();
        let fps = (status.frame_rate(chrono::Utc::now()) * 10.0).round() / 10.0;
        tracing::info!(
            connected = status.connected_workers,
            requested = status.frames_requested,
            completed = status.frames_completed,
            discarded = status.frames_discarded,
            rejected = status.strips_rejected,
            strip_errors = status.strip_errors,
            released = status.workers_released,
            in_flight = status.in_flight,
            zoom = status.zoom,
            max_iterations = status.max_iterations,
            fps,
            "Coordinator status",
        );
        for worker in &status.workers {
            tracing::debug!(
                worker_id = worker.id.0,
                endpoint = %worker.endpoint,
                state = ?worker.state,
                capability = worker.raw_capability,
                weight = worker.weight,
                "Worker status",
            );
        }
    }
}
