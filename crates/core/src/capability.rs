//! Worker capability estimation math.
//!
//! Workers are benchmarked with a fixed reference workload. The elapsed
//! time is converted into a raw throughput figure (higher = faster), and
//! the raw figures of the connected set are normalized so they sum to 1.

use serde::Serialize;

use crate::types::WorkerId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Scale constant `K` in `capability = K / elapsed_ms`.
pub const CAPABILITY_SCALE: f64 = 1000.0;

/// Raw capability assigned to a freshly connected, not yet benchmarked worker.
pub const DEFAULT_CAPABILITY: f64 = 1.0;

/// Raw capability assigned when a worker fails to answer the benchmark in
/// time. Small but non-zero, so a slow-but-alive worker still gets work.
pub const TIMED_OUT_CAPABILITY: f64 = 0.01;

/// Width of the reference benchmark workload in pixels.
pub const BENCHMARK_WIDTH: u32 = 512;

/// Height of the reference benchmark workload in pixels.
pub const BENCHMARK_HEIGHT: u32 = 512;

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// How a single worker's benchmark resolved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum BenchmarkOutcome {
    /// The worker reported its compute time for the reference workload.
    Completed { compute_ms: u64 },
    /// No result arrived within the benchmark timeout (or the connection
    /// went away while waiting).
    TimedOut,
}

/// One benchmark measurement. Transient: consumed immediately to update
/// the worker's capability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BenchmarkSample {
    pub worker_id: WorkerId,
    pub outcome: BenchmarkOutcome,
}

impl BenchmarkSample {
    /// Raw (un-normalized) capability implied by this sample.
    pub fn capability(&self) -> f64 {
        match self.outcome {
            BenchmarkOutcome::Completed { compute_ms } => capability_from_elapsed(compute_ms),
            BenchmarkOutcome::TimedOut => TIMED_OUT_CAPABILITY,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Convert a benchmark compute time into raw capability.
///
/// A zero reading is treated as 1 ms so that very fast workers do not
/// produce an infinite weight.
pub fn capability_from_elapsed(compute_ms: u64) -> f64 {
    CAPABILITY_SCALE / compute_ms.max(1) as f64
}

/// Rescale raw capabilities so they sum to 1.
///
/// Negative or non-finite inputs count as zero. If every input is zero the
/// result is uniform. An empty slice yields an empty vector.
pub fn normalize(raw: &[f64]) -> Vec<f64> {
    if raw.is_empty() {
        return Vec::new();
    }

    let cleaned: Vec<f64> = raw
        .iter()
        .map(|&v| if v.is_finite() && v > 0.0 { v } else { 0.0 })
        .collect();
    let total: f64 = cleaned.iter().sum();

    if total <= 0.0 {
        let uniform = 1.0 / cleaned.len() as f64;
        return vec![uniform; cleaned.len()];
    }

    cleaned.iter().map(|v| v / total).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn faster_workers_get_higher_capability() {
        assert!(capability_from_elapsed(100) > capability_from_elapsed(400));
        assert!((capability_from_elapsed(200) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_elapsed_is_clamped() {
        assert!((capability_from_elapsed(0) - CAPABILITY_SCALE).abs() < f64::EPSILON);
    }

    #[test]
    fn timed_out_sample_gets_minimal_capability() {
        let sample = BenchmarkSample {
            worker_id: WorkerId(1),
            outcome: BenchmarkOutcome::TimedOut,
        };
        assert_eq!(sample.capability(), TIMED_OUT_CAPABILITY);
        assert!(sample.capability() > 0.0);
    }

    #[test]
    fn timed_out_worker_is_dwarfed_after_normalization() {
        let fast = capability_from_elapsed(200);
        let weights = normalize(&[fast, TIMED_OUT_CAPABILITY]);
        assert!(weights[0] > 100.0 * weights[1]);
        assert!(weights[1] > 0.0);
    }

    #[test]
    fn normalize_empty() {
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn normalize_all_zero_is_uniform() {
        let weights = normalize(&[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(weights, vec![0.25; 4]);
    }

    #[test]
    fn normalize_ignores_non_finite() {
        let weights = normalize(&[f64::NAN, 2.0, f64::INFINITY, 2.0]);
        assert_eq!(weights, vec![0.0, 0.5, 0.0, 0.5]);
    }

    proptest! {
        #[test]
        fn normalized_weights_sum_to_one(raw in prop::collection::vec(0.0f64..10_000.0, 1..32)) {
            let weights = normalize(&raw);
            let total: f64 = weights.iter().sum();
            prop_assert!((total - 1.0).abs() < 1e-9);
            prop_assert!(weights.iter().all(|w| *w >= 0.0));
        }
    }
}
