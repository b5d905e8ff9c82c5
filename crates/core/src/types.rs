use serde::Serialize;

/// Monotonically increasing frame identifier, assigned by the scheduler.
pub type FrameId = u64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Index of a worker slot in the registry (0-based, stable for the
/// lifetime of the process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WorkerId(pub usize);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bytes per pixel of the RGB payload produced by workers.
pub const BYTES_PER_PIXEL: usize = 3;
