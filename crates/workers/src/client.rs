//! WebSocket client for one render worker endpoint.
//!
//! [`WorkerClient`] holds the address of a single worker. Call
//! [`WorkerClient::connect`] to establish a live [`WorkerConnection`]; the
//! attempt is bounded by a fixed timeout.

use std::time::Duration;

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use zoomfarm_core::types::WorkerId;

/// The raw WebSocket stream to a worker.
pub type WorkerStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection target for one worker slot.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    worker_id: WorkerId,
    endpoint: String,
}

/// A live connection to a worker.
#[derive(Debug)]
pub struct WorkerConnection {
    pub worker_id: WorkerId,
    pub ws_stream: WorkerStream,
}

impl WorkerClient {
    /// * `worker_id` - registry slot this client serves.
    /// * `endpoint`  - WebSocket URL, e.g. `ws://host:8080/ws`.
    pub fn new(worker_id: WorkerId, endpoint: String) -> Self {
        Self {
            worker_id,
            endpoint,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Open the WebSocket, giving up after `timeout`.
    pub async fn connect(&self, timeout: Duration) -> Result<WorkerConnection, WorkerClientError> {
        let attempt = tokio::time::timeout(timeout, connect_async(self.endpoint.as_str())).await;

        let (ws_stream, _response) = match attempt {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                return Err(WorkerClientError::Connection(format!(
                    "Failed to connect to worker at {}: {e}",
                    self.endpoint
                )));
            }
            Err(_) => return Err(WorkerClientError::Timeout(timeout)),
        };

        tracing::info!(
            worker_id = self.worker_id.0,
            endpoint = %self.endpoint,
            "Connected to worker",
        );

        Ok(WorkerConnection {
            worker_id: self.worker_id,
            ws_stream,
        })
    }
}

/// Errors that can occur when connecting to a worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerClientError {
    /// Transport or handshake failure.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The handshake did not finish in time.
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
}
