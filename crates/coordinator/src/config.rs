use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use zoomfarm_core::error::CoreError;
use zoomfarm_workers::reconnect::ReconnectConfig;

/// Coordinator configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local worker on port 8080.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Number of worker slots to manage (default: `4`).
    pub worker_count: usize,
    /// Worker endpoints, assigned round-robin by worker index.
    pub worker_endpoints: Vec<String>,
    /// Output frame width in pixels (default: `1280`).
    pub frame_width: u32,
    /// Output frame height in pixels (default: `720`).
    pub frame_height: u32,
    pub center_x: f64,
    pub center_y: f64,
    /// Iteration limit at zoom 1 (default: `256`).
    pub base_max_iterations: u32,
    /// Hard cap on the iteration limit (default: `8192`).
    pub max_iterations_ceiling: u32,
    /// Per-frame zoom multiplier, must exceed 1 (default: `1.02`).
    pub zoom_growth: f64,
    /// Maximum frames in flight (default: `2`).
    pub pipeline_depth: usize,
    /// Scheduler tick period (default: 16 ms).
    pub tick_interval: Duration,
    pub connect_timeout: Duration,
    pub benchmark_timeout: Duration,
    pub reconnect_delay: Duration,
    /// Pending frames older than this are discarded. `None` keeps them
    /// forever, so a lost strip stalls its pipeline slot.
    pub frame_deadline: Option<Duration>,
    /// Re-benchmark all connected workers on this period. `None` measures
    /// only once per connection.
    pub rebenchmark_interval: Option<Duration>,
    /// Where the PNG sink writes frames; `None` only counts them.
    pub output_dir: Option<PathBuf>,
    /// Save one in every `save_every` completed frames (default: `30`).
    pub save_every: u64,
    /// Period of the status log line (default: 5 s).
    pub status_interval: Duration,
}

impl CoordinatorConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                     | Default                    |
    /// |-----------------------------|----------------------------|
    /// | `WORKER_COUNT`              | `4`                        |
    /// | `WORKER_ENDPOINTS`          | `ws://127.0.0.1:8080/ws`   |
    /// | `FRAME_WIDTH`               | `1280`                     |
    /// | `FRAME_HEIGHT`              | `720`                      |
    /// | `CENTER_X`                  | `-0.743643887037151`       |
    /// | `CENTER_Y`                  | `0.131825904205330`        |
    /// | `BASE_MAX_ITERATIONS`       | `256`                      |
    /// | `MAX_ITERATIONS_CEILING`    | `8192`                     |
    /// | `ZOOM_GROWTH`               | `1.02`                     |
    /// | `PIPELINE_DEPTH`            | `2`                        |
    /// | `TICK_INTERVAL_MS`          | `16`                       |
    /// | `CONNECT_TIMEOUT_SECS`      | `5`                        |
    /// | `BENCHMARK_TIMEOUT_SECS`    | `10`                       |
    /// | `RECONNECT_DELAY_SECS`      | `2`                        |
    /// | `FRAME_DEADLINE_MS`         | `10000` (`0` disables)     |
    /// | `REBENCHMARK_INTERVAL_SECS` | `0` (disabled)             |
    /// | `OUTPUT_DIR`                | unset                      |
    /// | `SAVE_EVERY`                | `30`                       |
    /// | `STATUS_INTERVAL_SECS`      | `5`                        |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let worker_endpoints: Vec<String> = lookup("WORKER_ENDPOINTS")
            .unwrap_or_else(|| "ws://127.0.0.1:8080/ws".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let deadline_ms: u64 = parse_or(&lookup, "FRAME_DEADLINE_MS", 10_000)?;
        let rebench_secs: u64 = parse_or(&lookup, "REBENCHMARK_INTERVAL_SECS", 0)?;

        let config = Self {
            worker_count: parse_or(&lookup, "WORKER_COUNT", 4)?,
            worker_endpoints,
            frame_width: parse_or(&lookup, "FRAME_WIDTH", 1280)?,
            frame_height: parse_or(&lookup, "FRAME_HEIGHT", 720)?,
            center_x: parse_or(&lookup, "CENTER_X", -0.743643887037151)?,
            center_y: parse_or(&lookup, "CENTER_Y", 0.131825904205330)?,
            base_max_iterations: parse_or(&lookup, "BASE_MAX_ITERATIONS", 256)?,
            max_iterations_ceiling: parse_or(&lookup, "MAX_ITERATIONS_CEILING", 8192)?,
            zoom_growth: parse_or(&lookup, "ZOOM_GROWTH", 1.02)?,
            pipeline_depth: parse_or(&lookup, "PIPELINE_DEPTH", 2)?,
            tick_interval: Duration::from_millis(parse_or(&lookup, "TICK_INTERVAL_MS", 16)?),
            connect_timeout: Duration::from_secs(parse_or(&lookup, "CONNECT_TIMEOUT_SECS", 5)?),
            benchmark_timeout: Duration::from_secs(parse_or(
                &lookup,
                "BENCHMARK_TIMEOUT_SECS",
                10,
            )?),
            reconnect_delay: Duration::from_secs(parse_or(&lookup, "RECONNECT_DELAY_SECS", 2)?),
            frame_deadline: (deadline_ms > 0).then(|| Duration::from_millis(deadline_ms)),
            rebenchmark_interval: (rebench_secs > 0).then(|| Duration::from_secs(rebench_secs)),
            output_dir: lookup("OUTPUT_DIR")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            save_every: parse_or(&lookup, "SAVE_EVERY", 30)?,
            status_interval: Duration::from_secs(parse_or(&lookup, "STATUS_INTERVAL_SECS", 5)?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.worker_count == 0 {
            return Err(invalid("WORKER_COUNT must be at least 1"));
        }
        if self.worker_endpoints.is_empty() {
            return Err(invalid("WORKER_ENDPOINTS must list at least one endpoint"));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(invalid("FRAME_WIDTH and FRAME_HEIGHT must be non-zero"));
        }
        if !(self.zoom_growth.is_finite() && self.zoom_growth > 1.0) {
            return Err(invalid("ZOOM_GROWTH must be greater than 1"));
        }
        if self.base_max_iterations == 0 {
            return Err(invalid("BASE_MAX_ITERATIONS must be at least 1"));
        }
        if self.max_iterations_ceiling < self.base_max_iterations {
            return Err(invalid(
                "MAX_ITERATIONS_CEILING must not be below BASE_MAX_ITERATIONS",
            ));
        }
        if self.pipeline_depth == 0 {
            return Err(invalid("PIPELINE_DEPTH must be at least 1"));
        }
        if self.tick_interval.is_zero() {
            return Err(invalid("TICK_INTERVAL_MS must be at least 1"));
        }
        if self.save_every == 0 {
            return Err(invalid("SAVE_EVERY must be at least 1"));
        }
        if self.status_interval.is_zero() {
            return Err(invalid("STATUS_INTERVAL_SECS must be at least 1"));
        }
        Ok(())
    }

    /// Connection timing for the worker pool.
    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            connect_timeout: self.connect_timeout,
            delay: self.reconnect_delay,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, CoreError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(&format!("{key} has an invalid value: {raw:?}"))),
    }
}

fn invalid(msg: &str) -> CoreError {
    CoreError::Validation(msg.to_string())
}
