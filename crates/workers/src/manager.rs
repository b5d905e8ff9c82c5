//! Worker connection pool.
//!
//! [`WorkerPool`] owns one long-lived task per registry slot. Each task
//! runs connect -> session -> reconnect until cancelled, and reports every
//! transition on the shared event channel. The pool never touches the
//! registry; the scheduler applies events to it.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use zoomfarm_core::types::WorkerId;

use crate::client::WorkerClient;
use crate::events::{EventSender, WorkerEvent};
use crate::handle::WorkerHandle;
use crate::processor::run_session;
use crate::reconnect::{attempt, reconnect_loop, ReconnectConfig};

/// How long [`WorkerPool::shutdown`] waits for each task to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Connection tasks for a fixed set of worker slots.
pub struct WorkerPool {
    connections: Vec<ManagedConnection>,
    /// Master cancellation token, cancelled during shutdown.
    cancel: CancellationToken,
}

/// Internal bookkeeping for a single worker slot.
struct ManagedConnection {
    worker_id: WorkerId,
    task_handle: tokio::task::JoinHandle<()>,
}

impl WorkerPool {
    /// Spawn a connection task for each `(worker_id, endpoint)` slot.
    ///
    /// Tasks stop when `cancel` (or [`WorkerPool::shutdown`]) fires.
    pub fn start<I>(
        slots: I,
        config: ReconnectConfig,
        events: EventSender,
        cancel: &CancellationToken,
    ) -> Self
    where
        I: IntoIterator<Item = (WorkerId, String)>,
    {
        let cancel = cancel.child_token();

        let connections: Vec<ManagedConnection> = slots
            .into_iter()
            .map(|(worker_id, endpoint)| {
                let client = WorkerClient::new(worker_id, endpoint);
                let events = events.clone();
                let cancel = cancel.child_token();

                let task_handle = tokio::spawn(async move {
                    tracing::info!(
                        worker_id = worker_id.0,
                        endpoint = client.endpoint(),
                        "Starting connection task",
                    );
                    run_connection_loop(&client, &config, &events, &cancel).await;
                    tracing::info!(worker_id = worker_id.0, "Connection task exited");
                });

                ManagedConnection {
                    worker_id,
                    task_handle,
                }
            })
            .collect();

        tracing::info!(count = connections.len(), "Worker pool started");
        Self {
            connections,
            cancel,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Gracefully stop all connection tasks.
    ///
    /// Cancels the master token, then waits up to 5 seconds per task.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down worker pool");
        self.cancel.cancel();

        for managed in self.connections {
            tracing::debug!(worker_id = managed.worker_id.0, "Stopping connection task");
            if tokio::time::timeout(SHUTDOWN_GRACE, managed.task_handle)
                .await
                .is_err()
            {
                tracing::warn!(
                    worker_id = managed.worker_id.0,
                    "Connection task did not stop in time",
                );
            }
        }

        tracing::info!("Worker pool shut down complete");
    }
}

/// Core connection loop: connect -> session -> reconnect.
///
/// Runs until the cancellation token fires or the scheduler drops its
/// end of the event channel.
async fn run_connection_loop(
    client: &WorkerClient,
    config: &ReconnectConfig,
    events: &EventSender,
    cancel: &CancellationToken,
) {
    let worker_id = client.worker_id();
    let mut next = attempt(client, config, events, cancel).await;

    loop {
        let conn = match next.take() {
            Some(conn) => conn,
            None => match reconnect_loop(client, config, events, cancel).await {
                Some(conn) => conn,
                None => return, // cancelled
            },
        };

        // Closing the handle ends only this session, not the slot.
        let session = cancel.child_token();
        let (handle, commands) = WorkerHandle::with_session(worker_id, session.clone());
        if events
            .send(WorkerEvent::Connected { worker_id, handle })
            .is_err()
        {
            // Nobody is listening any more.
            return;
        }

        let mut ws_stream = conn.ws_stream;
        run_session(&mut ws_stream, worker_id, commands, events, &session).await;

        let _ = events.send(WorkerEvent::Disconnected { worker_id });

        if cancel.is_cancelled() || events.is_closed() {
            return;
        }

        tracing::info!(worker_id = worker_id.0, "Connection lost, entering reconnect loop");
    }
}
