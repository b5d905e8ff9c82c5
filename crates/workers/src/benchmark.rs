//! Benchmark barrier across connected workers.

use std::time::Duration;

use futures::future::join_all;
use zoomfarm_core::capability::{BenchmarkOutcome, BenchmarkSample};
use zoomfarm_core::types::WorkerId;

use crate::handle::WorkerHandle;

/// Ask every worker in `handles` to run the reference workload and wait
/// for all of them, each bounded by `timeout`.
///
/// A worker that does not answer in time, or whose connection drops while
/// the request is outstanding, yields [`BenchmarkOutcome::TimedOut`].
/// Samples come back in the order of `handles`.
pub async fn measure_all(
    handles: Vec<(WorkerId, WorkerHandle)>,
    width: u32,
    height: u32,
    timeout: Duration,
) -> Vec<BenchmarkSample> {
    tracing::info!(workers = handles.len(), width, height, "Benchmarking workers");

    let runs = handles
        .into_iter()
        .map(|(worker_id, handle)| measure_one(worker_id, handle, width, height, timeout));
    let samples = join_all(runs).await;

    for sample in &samples {
        match sample.outcome {
            BenchmarkOutcome::Completed { compute_ms } => tracing::info!(
                worker_id = sample.worker_id.0,
                compute_ms,
                capability = sample.capability(),
                "Benchmark completed",
            ),
            BenchmarkOutcome::TimedOut => tracing::warn!(
                worker_id = sample.worker_id.0,
                timeout_ms = timeout.as_millis() as u64,
                "Benchmark timed out",
            ),
        }
    }

    samples
}

async fn measure_one(
    worker_id: WorkerId,
    handle: WorkerHandle,
    width: u32,
    height: u32,
    timeout: Duration,
) -> BenchmarkSample {
    let outcome = match handle.benchmark(width, height) {
        Ok(rx) => match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(compute_ms)) => BenchmarkOutcome::Completed { compute_ms },
            Ok(Err(_)) | Err(_) => BenchmarkOutcome::TimedOut,
        },
        Err(_) => BenchmarkOutcome::TimedOut,
    };
    BenchmarkSample { worker_id, outcome }
}
