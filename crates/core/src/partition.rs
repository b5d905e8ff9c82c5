//! Capability-proportional strip partitioning.
//!
//! Divides a frame's row range `[0, H)` into contiguous strips, one per
//! idle worker, sized in proportion to each worker's weight. Workers are
//! processed in the order given (the registry's index-ascending order);
//! the last worker always absorbs the rounding remainder so coverage is
//! exact.

use std::ops::Range;

use serde::Serialize;

use crate::types::WorkerId;

/// A contiguous row range assigned to one worker for one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StripAssignment {
    pub worker_id: WorkerId,
    pub rows: Range<u32>,
}

/// Split `total_rows` among `workers` in proportion to their weights.
///
/// Every non-last worker gets `round(H * w / sum)` rows, clamped to at
/// least one and to at most the rows that are left after reserving one
/// row for each later worker (the reservation is skipped when too few rows
/// remain). The last worker takes whatever is left. Workers that end up
/// with zero rows are omitted.
///
/// Returns an empty vector when there are no workers or no rows.
pub fn partition_rows(workers: &[(WorkerId, f64)], total_rows: u32) -> Vec<StripAssignment> {
    if workers.is_empty() || total_rows == 0 {
        return Vec::new();
    }

    let usable = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
    let weight_sum: f64 = workers.iter().map(|(_, w)| usable(*w)).sum();
    let equal_share = weight_sum <= 0.0;

    let mut assignments = Vec::with_capacity(workers.len());
    let mut cursor = 0u32;
    let last = workers.len() - 1;

    for (i, &(worker_id, weight)) in workers.iter().enumerate() {
        let remaining = total_rows - cursor;

        let rows = if i == last {
            remaining
        } else {
            let share = if equal_share {
                1.0 / workers.len() as f64
            } else {
                usable(weight) / weight_sum
            };
            let ideal = (total_rows as f64 * share).round() as u32;

            let later = (last - i) as u32;
            let upper = if remaining > later {
                remaining - later
            } else {
                remaining.min(1)
            };
            ideal.max(1).min(upper)
        };

        if rows == 0 {
            continue;
        }

        assignments.push(StripAssignment {
            worker_id,
            rows: cursor..cursor + rows,
        });
        cursor += rows;
    }

    assignments
}
