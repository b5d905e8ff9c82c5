//! Fixed-delay reconnection for worker connections.
//!
//! When a worker is unreachable or drops, its connection task calls
//! [`reconnect_loop`], which keeps retrying after a fixed delay until the
//! connection is restored or the [`CancellationToken`] fires. Each attempt
//! is reported on the event channel so the registry can track the
//! Connecting / Disconnected transitions.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{WorkerClient, WorkerConnection};
use crate::events::{EventSender, WorkerEvent};

/// Timing parameters for connection attempts.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    /// Upper bound on a single connection handshake.
    pub connect_timeout: Duration,
    /// Pause between a failure (or drop) and the next attempt.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            delay: Duration::from_secs(2),
        }
    }
}

/// Make one connection attempt, reporting it on `events`.
///
/// Returns `None` if the attempt failed or `cancel` fired mid-handshake.
pub async fn attempt(
    client: &WorkerClient,
    config: &ReconnectConfig,
    events: &EventSender,
    cancel: &CancellationToken,
) -> Option<WorkerConnection> {
    let worker_id = client.worker_id();
    let _ = events.send(WorkerEvent::Connecting { worker_id });

    let result = tokio::select! {
        _ = cancel.cancelled() => return None,
        result = client.connect(config.connect_timeout) => result,
    };

    match result {
        Ok(conn) => Some(conn),
        Err(e) => {
            tracing::warn!(
                worker_id = worker_id.0,
                endpoint = client.endpoint(),
                error = %e,
                "Worker connection attempt failed",
            );
            let _ = events.send(WorkerEvent::ConnectFailed {
                worker_id,
                error: e.to_string(),
            });
            None
        }
    }
}

/// Retry with a fixed delay until connected.
///
/// Returns `Some(connection)` once an attempt succeeds, or `None` if
/// `cancel` is triggered first. Retries indefinitely otherwise.
pub async fn reconnect_loop(
    client: &WorkerClient,
    config: &ReconnectConfig,
    events: &EventSender,
    cancel: &CancellationToken,
) -> Option<WorkerConnection> {
    let mut attempt_no = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(worker_id = client.worker_id().0, "Reconnect cancelled");
                return None;
            }
            _ = tokio::time::sleep(config.delay) => {}
        }

        attempt_no += 1;
        tracing::info!(
            worker_id = client.worker_id().0,
            attempt = attempt_no,
            delay_ms = config.delay.as_millis() as u64,
            "Reconnecting to worker",
        );

        if let Some(conn) = attempt(client, config, events, cancel).await {
            tracing::info!(
                worker_id = client.worker_id().0,
                attempt = attempt_no,
                "Reconnected to worker",
            );
            return Some(conn);
        }

        if cancel.is_cancelled() {
            return None;
        }
    }
}
