//! The scheduler loop.
//!
//! A single task owns the worker registry, the frame tracker, the zoom
//! state and the frame sink. Worker connections run on their own tasks and
//! only ever talk to the scheduler through the event channel, so every
//! piece of scheduling state has exactly one writer and needs no locks.
//!
//! Each tick:
//! 1. Discard pending frames whose reclaim deadline has passed and drop
//!    the connections of workers that still owe strips for them.
//! 2. Stop if the pipeline is full or no connected worker is idle.
//! 3. Partition the frame's rows over the idle workers by capability,
//!    track the frame, send one render per strip, mark those workers busy.
//! 4. Advance the zoom.

use std::collections::HashSet;
use std::future::pending;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use zoomfarm_core::capability::{BenchmarkSample, BENCHMARK_HEIGHT, BENCHMARK_WIDTH};
use zoomfarm_core::error::CoreError;
use zoomfarm_core::frame::{Frame, Strip};
use zoomfarm_core::partition::partition_rows;
use zoomfarm_core::pipeline::PipelineGovernor;
use zoomfarm_core::registry::{WorkerRegistry, WorkerSnapshot};
use zoomfarm_core::tracker::{FrameTracker, StripOutcome};
use zoomfarm_core::types::{FrameId, WorkerId};
use zoomfarm_core::zoom::ZoomState;
use zoomfarm_workers::benchmark::measure_all;
use zoomfarm_workers::events::{self, EventReceiver, WorkerEvent};
use zoomfarm_workers::handle::WorkerHandle;
use zoomfarm_workers::manager::WorkerPool;
use zoomfarm_workers::messages::RenderRequest;

use crate::config::CoordinatorConfig;
use crate::sink::FrameSink;
use crate::status::{StatusReceiver, StatusSnapshot};

/// Extra time granted on top of the connect timeout for the first round
/// of connection attempts to report back.
const STARTUP_GRACE: Duration = Duration::from_millis(500);

/// Drives frame requests across the worker pool.
pub struct Scheduler {
    config: CoordinatorConfig,
    registry: WorkerRegistry<WorkerHandle>,
    tracker: FrameTracker,
    governor: PipelineGovernor,
    zoom: ZoomState,
    sink: Box<dyn FrameSink>,
    next_frame_id: FrameId,
    /// Set once the startup benchmark barrier has run. Connections made
    /// after that are benchmarked individually in the background.
    started: bool,
    status: StatusSnapshot,
    status_tx: watch::Sender<StatusSnapshot>,
    bench_tx: mpsc::UnboundedSender<Vec<BenchmarkSample>>,
    bench_rx: mpsc::UnboundedReceiver<Vec<BenchmarkSample>>,
}

impl Scheduler {
    /// Build a scheduler and the receiver its status is published on.
    pub fn new(
        config: CoordinatorConfig,
        sink: Box<dyn FrameSink>,
    ) -> Result<(Self, StatusReceiver), CoreError> {
        config.validate()?;

        let zoom = ZoomState::new(
            config.center_x,
            config.center_y,
            config.zoom_growth,
            config.base_max_iterations,
            config.max_iterations_ceiling,
        )?;
        let registry = WorkerRegistry::new(config.worker_count, &config.worker_endpoints);
        let governor = PipelineGovernor::new(config.pipeline_depth);

        let status = StatusSnapshot::new(chrono::Utc::now(), zoom.zoom(), zoom.max_iterations());
        let (status_tx, status_rx) = watch::channel(status.clone());
        let (bench_tx, bench_rx) = mpsc::unbounded_channel();

        let scheduler = Self {
            config,
            registry,
            tracker: FrameTracker::new(),
            governor,
            zoom,
            sink,
            next_frame_id: 0,
            started: false,
            status,
            status_tx,
            bench_tx,
            bench_rx,
        };
        Ok((scheduler, status_rx))
    }

    /// Connect to the workers, benchmark them, and run the tick loop until
    /// `cancel` fires. All connections are closed and every pending frame
    /// is discarded before this returns.
    pub async fn run(mut self, cancel: CancellationToken) {
        let (events_tx, mut events_rx) = events::channel();
        let slots: Vec<(WorkerId, String)> = self
            .registry
            .iter()
            .map(|w| (w.id, w.endpoint.clone()))
            .collect();
        let pool = WorkerPool::start(slots, self.config.reconnect(), events_tx, &cancel);

        tracing::info!(
            workers = self.registry.len(),
            width = self.config.frame_width,
            height = self.config.frame_height,
            pipeline_depth = self.governor.depth(),
            "Scheduler starting",
        );

        if self.start_up(&mut events_rx, &cancel).await {
            self.run_loop(&mut events_rx, &cancel).await;
        }

        let discarded = self.tracker.discard_all();
        pool.shutdown().await;
        self.registry.disconnect_all();
        self.status.frames_discarded += discarded as u64;
        self.publish_workers();

        tracing::info!(
            discarded,
            completed = self.status.frames_completed,
            requested = self.status.frames_requested,
            "Scheduler stopped",
        );
    }

    // ---- startup ----

    /// Wait for every worker's first connection attempt, then benchmark
    /// the connected set. Returns `false` if cancelled.
    async fn start_up(&mut self, events_rx: &mut EventReceiver, cancel: &CancellationToken) -> bool {
        let deadline = tokio::time::Instant::now() + self.config.connect_timeout + STARTUP_GRACE;
        let mut resolved: HashSet<WorkerId> = HashSet::new();

        while resolved.len() < self.registry.len() {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        resolved = resolved.len(),
                        expected = self.registry.len(),
                        "Not every worker answered its first connection attempt",
                    );
                    break;
                }
                Some(event) = events_rx.recv() => {
                    if matches!(event, WorkerEvent::Connected { .. } | WorkerEvent::ConnectFailed { .. }) {
                        resolved.insert(event.worker_id());
                    }
                    self.handle_event(event);
                }
            }
        }

        let handles = self.connected_handles();
        tracing::info!(connected = handles.len(), "Initial connections settled");

        let samples = tokio::select! {
            _ = cancel.cancelled() => return false,
            samples = measure_all(
                handles,
                BENCHMARK_WIDTH,
                BENCHMARK_HEIGHT,
                self.config.benchmark_timeout,
            ) => samples,
        };
        self.apply_samples(samples);
        self.started = true;
        true
    }

    // ---- main loop ----

    async fn run_loop(&mut self, events_rx: &mut EventReceiver, cancel: &CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut rebench = self.config.rebenchmark_interval.map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        tracing::info!(
            tick_ms = self.config.tick_interval.as_millis() as u64,
            "Scheduler loop started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(Instant::now());
                }
                Some(event) = events_rx.recv() => {
                    self.handle_event(event);
                }
                Some(samples) = self.bench_rx.recv() => {
                    self.apply_samples(samples);
                }
                _ = async {
                    match rebench.as_mut() {
                        Some(interval) => interval.tick().await,
                        None => pending().await,
                    }
                } => {
                    let handles = self.connected_handles();
                    if !handles.is_empty() {
                        tracing::info!(workers = handles.len(), "Re-benchmarking connected workers");
                        self.spawn_benchmark(handles);
                    }
                }
            }
        }
    }

    /// One scheduling step. Requests at most one frame.
    fn tick(&mut self, now: Instant) {
        let expired = self.tracker.discard_expired(now);
        if !expired.is_empty() {
            tracing::warn!(frames = ?expired, "Reclaimed frames past their deadline");
            self.status.frames_discarded += expired.len() as u64;
            for frame_id in &expired {
                self.release_unresponsive(*frame_id);
            }
            self.publish_workers();
        }

        if !self.governor.admits(self.tracker.in_flight()) {
            return;
        }

        let idle = self.registry.idle_connected();
        if idle.is_empty() {
            return;
        }

        let assignments = partition_rows(&idle, self.config.frame_height);
        if assignments.is_empty() {
            return;
        }

        let frame = Frame {
            id: self.next_frame_id,
            width: self.config.frame_width,
            height: self.config.frame_height,
            viewport: self.zoom.snapshot(),
        };
        self.next_frame_id += 1;

        self.tracker.begin_frame(
            frame,
            assignments.iter().map(|a| a.rows.clone()),
            self.config.frame_deadline,
        );

        for assignment in &assignments {
            let request = RenderRequest::for_strip(&frame, assignment.rows.start, assignment.rows.end);
            let sent = match self.registry.handle(assignment.worker_id) {
                Some(handle) => handle.render(request).is_ok(),
                None => false,
            };

            if sent {
                self.registry
                    .mark_busy(assignment.worker_id, frame.id, assignment.rows.start);
            } else {
                // The disconnect event is already queued; the frame can
                // only finish through reclaim.
                tracing::warn!(
                    worker_id = assignment.worker_id.0,
                    frame_id = frame.id,
                    "Worker connection closed before dispatch",
                );
            }
        }

        tracing::debug!(
            frame_id = frame.id,
            strips = assignments.len(),
            zoom = frame.viewport.zoom,
            max_iterations = frame.viewport.max_iterations,
            "Frame requested",
        );

        self.zoom.advance();
        self.status.frames_requested += 1;
        self.publish();
    }

    /// Disconnect every worker still owing a strip for a reclaimed frame.
    /// The connection is still up but the worker stopped answering, so it
    /// goes back through reconnect and a fresh benchmark.
    fn release_unresponsive(&mut self, frame_id: FrameId) {
        for worker_id in self.registry.owing(frame_id) {
            if let Some(handle) = self.registry.handle(worker_id) {
                handle.close();
            }
            self.registry.mark_disconnected(worker_id);
            self.status.workers_released += 1;
            tracing::warn!(
                worker_id = worker_id.0,
                frame_id,
                "Worker never delivered its strip; dropping connection",
            );
        }
    }

    // ---- events ----

    fn handle_event(&mut self, event: WorkerEvent) {
        let lifecycle = matches!(
            event,
            WorkerEvent::Connecting { .. }
                | WorkerEvent::Connected { .. }
                | WorkerEvent::ConnectFailed { .. }
                | WorkerEvent::Disconnected { .. }
        );
        match event {
            WorkerEvent::Connecting { worker_id } => {
                self.registry.mark_connecting(worker_id);
            }
            WorkerEvent::Connected { worker_id, handle } => {
                self.registry.mark_connected(worker_id, handle.clone());
                tracing::info!(
                    worker_id = worker_id.0,
                    connected = self.registry.connected_count(),
                    "Worker joined",
                );
                if self.started {
                    self.spawn_benchmark(vec![(worker_id, handle)]);
                }
            }
            WorkerEvent::ConnectFailed { worker_id, .. } => {
                self.registry.mark_connect_failed(worker_id);
            }
            WorkerEvent::Disconnected { worker_id } => {
                let owed = self.registry.mark_disconnected(worker_id);
                match owed {
                    Some(owed) => tracing::warn!(
                        worker_id = worker_id.0,
                        frame_id = owed.frame_id,
                        row_start = owed.row_start,
                        "Worker dropped while rendering; its strip is lost",
                    ),
                    None => tracing::warn!(worker_id = worker_id.0, "Worker disconnected"),
                }
            }
            WorkerEvent::StripArrived { worker_id, strip } => {
                self.on_strip(worker_id, strip);
            }
            WorkerEvent::MalformedStrip { worker_id, detail } => {
                self.registry.clear_busy(worker_id);
                self.status.strips_rejected += 1;
                tracing::warn!(worker_id = worker_id.0, %detail, "Rejected malformed strip");
            }
            WorkerEvent::WorkerError { worker_id, message } => {
                match self.tracker.on_strip_error(&mut self.registry, worker_id) {
                    Some(frame_id) => {
                        self.status.strip_errors += 1;
                        tracing::warn!(
                            worker_id = worker_id.0,
                            frame_id,
                            %message,
                            "Strip failed; frame cannot complete",
                        );
                    }
                    None => tracing::warn!(
                        worker_id = worker_id.0,
                        %message,
                        "Error from a worker that owes no strip",
                    ),
                }
            }
            WorkerEvent::ProtocolViolation { worker_id, detail } => {
                tracing::warn!(worker_id = worker_id.0, %detail, "Worker protocol violation");
            }
        }
        if lifecycle {
            self.publish_workers();
        } else {
            self.publish();
        }
    }

    fn on_strip(&mut self, worker_id: WorkerId, strip: Strip) {
        let frame_id = strip.frame_id;
        match self.tracker.on_strip_arrived(&mut self.registry, worker_id, strip) {
            Ok(StripOutcome::Completed(assembled)) => {
                self.status.frames_completed += 1;
                tracing::debug!(
                    frame_id,
                    elapsed_ms = assembled.elapsed.as_millis() as u64,
                    "Frame assembled",
                );
                self.sink.present(assembled);
            }
            Ok(StripOutcome::Pending { received, expected }) => {
                tracing::trace!(frame_id, received, expected, "Strip accepted");
            }
            Ok(StripOutcome::Dropped) => {
                tracing::debug!(worker_id = worker_id.0, frame_id, "Dropped strip for stale frame");
            }
            Err(e) => {
                self.status.strips_rejected += 1;
                tracing::warn!(worker_id = worker_id.0, frame_id, error = %e, "Rejected strip");
            }
        }
    }

    // ---- capability ----

    fn connected_handles(&self) -> Vec<(WorkerId, WorkerHandle)> {
        self.registry
            .connected_handles()
            .into_iter()
            .map(|(id, handle)| (id, handle.clone()))
            .collect()
    }

    /// Benchmark `handles` off the scheduler task; the samples come back on
    /// the benchmark channel.
    fn spawn_benchmark(&self, handles: Vec<(WorkerId, WorkerHandle)>) {
        let tx = self.bench_tx.clone();
        let timeout = self.config.benchmark_timeout;
        tokio::spawn(async move {
            let samples = measure_all(handles, BENCHMARK_WIDTH, BENCHMARK_HEIGHT, timeout).await;
            let _ = tx.send(samples);
        });
    }

    fn apply_samples(&mut self, samples: Vec<BenchmarkSample>) {
        for sample in samples {
            if !self.registry.record_capability(sample.worker_id, sample.capability()) {
                tracing::debug!(
                    worker_id = sample.worker_id.0,
                    "Discarding benchmark for disconnected worker",
                );
            }
        }
        for worker in self.registry.iter().filter(|w| w.is_connected()) {
            tracing::info!(
                worker_id = worker.id.0,
                capability = worker.raw_capability(),
                weight = worker.weight(),
                "Worker capability",
            );
        }
        self.publish_workers();
    }

    // ---- status ----

    /// Publish the counters, keeping the last published worker list.
    fn publish(&mut self) {
        self.publish_with(None);
    }

    /// Publish the counters and a fresh worker list. Used when a worker
    /// joins, leaves or gets a new capability.
    fn publish_workers(&mut self) {
        self.publish_with(Some(self.registry.snapshot()));
    }

    /// `self.status.workers` stays empty; the list lives only in the watch
    /// channel so counter updates never copy it.
    fn publish_with(&mut self, workers: Option<Vec<WorkerSnapshot>>) {
        self.status.connected_workers = self.registry.connected_count();
        self.status.in_flight = self.tracker.in_flight();
        self.status.zoom = self.zoom.zoom();
        self.status.max_iterations = self.zoom.max_iterations();

        let counters = &self.status;
        self.status_tx.send_modify(|published| {
            let workers = workers.unwrap_or_else(|| std::mem::take(&mut published.workers));
            *published = StatusSnapshot {
                workers,
                ..counters.clone()
            };
        });
    }
}

#[cfg(test)]
mod tests {
    use zoomfarm_core::capability::BenchmarkOutcome;
    use zoomfarm_core::frame::AssembledFrame;
    use zoomfarm_core::registry::ConnectionState;
    use zoomfarm_workers::handle::WorkerCommand;

    use super::*;
    use crate::sink::ChannelSink;

    type Commands = tokio::sync::mpsc::UnboundedReceiver<WorkerCommand>;

    fn test_config(workers: usize) -> CoordinatorConfig {
        let mut config = CoordinatorConfig::from_lookup(|_| None).unwrap();
        config.worker_count = workers;
        config.frame_width = 2;
        config.frame_height = 100;
        config.frame_deadline = Some(Duration::from_secs(1));
        config
    }

    fn scheduler(
        workers: usize,
    ) -> (
        Scheduler,
        tokio::sync::mpsc::UnboundedReceiver<AssembledFrame>,
    ) {
        let (sink, frames) = ChannelSink::new();
        let (scheduler, _status) = Scheduler::new(test_config(workers), Box::new(sink)).unwrap();
        (scheduler, frames)
    }

    fn connect(scheduler: &mut Scheduler, id: usize) -> Commands {
        let (handle, commands) = WorkerHandle::new(WorkerId(id));
        scheduler.handle_event(WorkerEvent::Connected {
            worker_id: WorkerId(id),
            handle,
        });
        commands
    }

    fn render_of(commands: &mut Commands) -> RenderRequest {
        match commands.try_recv().unwrap() {
            WorkerCommand::Render(req) => req,
            other => panic!("Expected Render, got {other:?}"),
        }
    }

    fn strip_for(req: &RenderRequest, fill: u8) -> Strip {
        Strip {
            frame_id: req.frame_id,
            row_start: req.y_start,
            row_end: req.y_end,
            pixels: vec![fill; (req.y_end - req.y_start) as usize * req.width as usize * 3],
        }
    }

    #[tokio::test]
    async fn tick_partitions_by_capability_and_marks_busy() {
        let (mut scheduler, _frames) = scheduler(3);
        let mut commands: Vec<Commands> = (0..3).map(|i| connect(&mut scheduler, i)).collect();
        scheduler.apply_samples(vec![
            BenchmarkSample {
                worker_id: WorkerId(0),
                outcome: BenchmarkOutcome::Completed { compute_ms: 200 },
            },
            BenchmarkSample {
                worker_id: WorkerId(1),
                outcome: BenchmarkOutcome::Completed { compute_ms: 333 },
            },
            BenchmarkSample {
                worker_id: WorkerId(2),
                outcome: BenchmarkOutcome::Completed { compute_ms: 500 },
            },
        ]);

        scheduler.tick(Instant::now());

        let rows: Vec<(u32, u32)> = commands
            .iter_mut()
            .map(|c| {
                let req = render_of(c);
                (req.y_start, req.y_end)
            })
            .collect();
        assert_eq!(rows, vec![(0, 50), (50, 80), (80, 100)]);
        assert_eq!(scheduler.registry.busy_count(), 3);
        assert_eq!(scheduler.tracker.in_flight(), 1);
        assert_eq!(scheduler.status.frames_requested, 1);
    }

    #[tokio::test]
    async fn no_idle_workers_requests_nothing() {
        let (mut scheduler, _frames) = scheduler(2);
        let zoom_before = scheduler.zoom.zoom();

        scheduler.tick(Instant::now());

        assert_eq!(scheduler.tracker.in_flight(), 0);
        assert_eq!(scheduler.next_frame_id, 0);
        assert_eq!(scheduler.zoom.zoom(), zoom_before);
    }

    #[tokio::test]
    async fn pipeline_cap_bounds_pending_frames() {
        let (mut scheduler, _frames) = scheduler(4);
        let _commands: Vec<Commands> = (0..4).map(|i| connect(&mut scheduler, i)).collect();

        // Four idle workers, but only two frames may be in flight. Free
        // every worker between ticks so idleness never limits dispatch.
        for _ in 0..5 {
            scheduler.tick(Instant::now());
            for id in 0..4 {
                scheduler.registry.clear_busy(WorkerId(id));
            }
            assert!(scheduler.tracker.in_flight() <= 2);
        }
        assert_eq!(scheduler.status.frames_requested, 2);
    }

    #[tokio::test]
    async fn zoom_advances_per_requested_frame() {
        let (mut scheduler, _frames) = scheduler(1);
        let mut commands = connect(&mut scheduler, 0);

        scheduler.tick(Instant::now());
        let first = render_of(&mut commands);
        scheduler.handle_event(WorkerEvent::StripArrived {
            worker_id: WorkerId(0),
            strip: strip_for(&first, 1),
        });
        scheduler.tick(Instant::now());
        let second = render_of(&mut commands);

        assert!(second.zoom > first.zoom);
        assert_eq!(second.frame_id, first.frame_id + 1);
    }

    #[tokio::test]
    async fn completed_frame_reaches_sink_in_row_order() {
        let (mut scheduler, mut frames) = scheduler(2);
        let mut c0 = connect(&mut scheduler, 0);
        let mut c1 = connect(&mut scheduler, 1);

        scheduler.tick(Instant::now());
        let top = render_of(&mut c0);
        let bottom = render_of(&mut c1);

        // Bottom strip first.
        scheduler.handle_event(WorkerEvent::StripArrived {
            worker_id: WorkerId(1),
            strip: strip_for(&bottom, 2),
        });
        scheduler.handle_event(WorkerEvent::StripArrived {
            worker_id: WorkerId(0),
            strip: strip_for(&top, 1),
        });

        let frame = frames.try_recv().unwrap();
        let split = top.y_end as usize * 2 * 3;
        assert_eq!(frame.pixels.len(), 100 * 2 * 3);
        assert!(frame.pixels[..split].iter().all(|&b| b == 1));
        assert!(frame.pixels[split..].iter().all(|&b| b == 2));
        assert_eq!(scheduler.status.frames_completed, 1);
        assert_eq!(scheduler.registry.busy_count(), 0);
    }

    #[tokio::test]
    async fn strip_error_stalls_until_reclaimed() {
        let (mut scheduler, mut frames) = scheduler(2);
        let mut c0 = connect(&mut scheduler, 0);
        let mut c1 = connect(&mut scheduler, 1);

        let start = Instant::now();
        scheduler.tick(start);
        let top = render_of(&mut c0);
        let _bottom = render_of(&mut c1);

        scheduler.handle_event(WorkerEvent::StripArrived {
            worker_id: WorkerId(0),
            strip: strip_for(&top, 1),
        });
        scheduler.handle_event(WorkerEvent::WorkerError {
            worker_id: WorkerId(1),
            message: "out of memory".into(),
        });

        assert!(frames.try_recv().is_err());
        assert!(scheduler.tracker.is_pending(top.frame_id));
        assert_eq!(scheduler.registry.busy_count(), 0);
        assert_eq!(scheduler.status.strip_errors, 1);

        // Past the one-second deadline the frame is reclaimed and a new
        // one takes its place.
        scheduler.tick(Instant::now() + Duration::from_secs(2));
        assert!(!scheduler.tracker.is_pending(top.frame_id));
        assert_eq!(scheduler.status.frames_discarded, 1);
        assert_eq!(scheduler.status.frames_requested, 2);
    }

    #[tokio::test]
    async fn duplicate_strip_is_rejected() {
        let (mut scheduler, mut frames) = scheduler(2);
        let mut c0 = connect(&mut scheduler, 0);
        let _c1 = connect(&mut scheduler, 1);

        scheduler.tick(Instant::now());
        let top = render_of(&mut c0);

        for _ in 0..2 {
            scheduler.handle_event(WorkerEvent::StripArrived {
                worker_id: WorkerId(0),
                strip: strip_for(&top, 1),
            });
        }

        assert_eq!(scheduler.status.strips_rejected, 1);
        assert_eq!(scheduler.tracker.received_count(top.frame_id), Some(1));
        assert!(frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_while_busy_frees_the_slot() {
        let (mut scheduler, _frames) = scheduler(2);
        let _c0 = connect(&mut scheduler, 0);
        let _c1 = connect(&mut scheduler, 1);
        scheduler.tick(Instant::now());

        scheduler.handle_event(WorkerEvent::Disconnected {
            worker_id: WorkerId(1),
        });

        assert_eq!(
            scheduler.registry.get(WorkerId(1)).unwrap().state(),
            ConnectionState::Disconnected
        );
        assert_eq!(scheduler.registry.connected_count(), 1);
        assert!((scheduler.registry.weight_sum() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn malformed_strip_releases_worker() {
        let (mut scheduler, _frames) = scheduler(1);
        let _c0 = connect(&mut scheduler, 0);
        scheduler.tick(Instant::now());
        assert_eq!(scheduler.registry.busy_count(), 1);

        scheduler.handle_event(WorkerEvent::MalformedStrip {
            worker_id: WorkerId(0),
            detail: "bad base64".into(),
        });

        assert_eq!(scheduler.registry.busy_count(), 0);
        assert_eq!(scheduler.status.strips_rejected, 1);
    }

    #[tokio::test]
    async fn status_is_published() {
        let (sink, _frames) = ChannelSink::new();
        let (mut scheduler, status) = Scheduler::new(test_config(2), Box::new(sink)).unwrap();
        let _c0 = connect(&mut scheduler, 0);

        let snapshot = status.borrow().clone();
        assert_eq!(snapshot.connected_workers, 1);
        assert_eq!(snapshot.workers.len(), 2);
        assert_eq!(snapshot.workers[0].weight, 1.0);
    }

    #[tokio::test]
    async fn unresponsive_worker_is_dropped_when_its_frame_is_reclaimed() {
        let (mut scheduler, _frames) = scheduler(2);
        let session = tokio_util::sync::CancellationToken::new();
        let (silent, mut c0) = WorkerHandle::with_session(WorkerId(0), session.clone());
        scheduler.handle_event(WorkerEvent::Connected {
            worker_id: WorkerId(0),
            handle: silent,
        });
        let mut c1 = connect(&mut scheduler, 1);

        let start = Instant::now();
        scheduler.tick(start);
        let _top = render_of(&mut c0);
        let bottom = render_of(&mut c1);
        scheduler.handle_event(WorkerEvent::StripArrived {
            worker_id: WorkerId(1),
            strip: strip_for(&bottom, 2),
        });

        // Worker 0 never answers. Once the frame is reclaimed its session
        // is closed and it leaves the connected set.
        scheduler.tick(start + Duration::from_secs(2));

        assert!(session.is_cancelled());
        assert_eq!(
            scheduler.registry.get(WorkerId(0)).unwrap().state(),
            ConnectionState::Disconnected
        );
        assert_eq!(scheduler.status.workers_released, 1);
        assert_eq!(scheduler.status.frames_discarded, 1);
        assert_eq!(scheduler.registry.connected_count(), 1);

        // The replacement frame went to worker 1 alone.
        let next = render_of(&mut c1);
        assert_eq!((next.y_start, next.y_end), (0, 100));

        // The pool reports the closed session, then a fresh connection.
        scheduler.handle_event(WorkerEvent::Disconnected {
            worker_id: WorkerId(0),
        });
        let _c0 = connect(&mut scheduler, 0);
        assert_eq!(
            scheduler.registry.get(WorkerId(0)).unwrap().state(),
            ConnectionState::Idle
        );
    }

    #[tokio::test]
    async fn strip_arrivals_keep_the_published_worker_list() {
        let (sink, _frames) = ChannelSink::new();
        let (mut scheduler, status) = Scheduler::new(test_config(1), Box::new(sink)).unwrap();
        let mut c0 = connect(&mut scheduler, 0);
        scheduler.tick(Instant::now());
        let req = render_of(&mut c0);

        scheduler.handle_event(WorkerEvent::StripArrived {
            worker_id: WorkerId(0),
            strip: strip_for(&req, 1),
        });

        let snapshot = status.borrow().clone();
        assert_eq!(snapshot.frames_completed, 1);
        assert_eq!(snapshot.workers.len(), 1);
        assert!(scheduler.status.workers.is_empty());
    }
}
