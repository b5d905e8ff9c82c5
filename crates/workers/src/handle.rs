//! Outbound command handle for a connected worker.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use zoomfarm_core::types::WorkerId;

use crate::messages::{RenderRequest, WorkerRequest};

/// Commands accepted by a connection's session task.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Forward a render request; the strip comes back as an event.
    Render(RenderRequest),
    /// Run the benchmark workload; the compute time is sent on `reply`.
    Benchmark {
        width: u32,
        height: u32,
        reply: oneshot::Sender<u64>,
    },
}

impl WorkerCommand {
    /// The wire request this command produces.
    pub fn request(&self) -> WorkerRequest {
        match self {
            Self::Render(req) => WorkerRequest::Render(req.clone()),
            Self::Benchmark { width, height, .. } => WorkerRequest::Benchmark {
                width: *width,
                height: *height,
            },
        }
    }
}

/// Cheap, cloneable handle to one live connection.
///
/// Sending never blocks. Once the connection drops every send fails with
/// [`WorkerGone`]. [`close`](Self::close) ends the session from the
/// scheduler side.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    worker_id: WorkerId,
    tx: mpsc::UnboundedSender<WorkerCommand>,
    session: CancellationToken,
}

/// The connection behind a handle has closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Worker {0} is no longer connected")]
pub struct WorkerGone(pub WorkerId);

impl WorkerHandle {
    /// Create a handle and the receiver its session task drains.
    pub fn new(worker_id: WorkerId) -> (Self, mpsc::UnboundedReceiver<WorkerCommand>) {
        Self::with_session(worker_id, CancellationToken::new())
    }

    /// Like [`new`](Self::new), with `session` as the token the session
    /// task stops on.
    pub fn with_session(
        worker_id: WorkerId,
        session: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                worker_id,
                tx,
                session,
            },
            rx,
        )
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Ask the session to close the socket. The pool reports the
    /// disconnect and reconnects as usual.
    pub fn close(&self) {
        self.session.cancel();
    }

    pub fn close_requested(&self) -> bool {
        self.session.is_cancelled()
    }

    /// Queue a strip render.
    pub fn render(&self, request: RenderRequest) -> Result<(), WorkerGone> {
        self.tx
            .send(WorkerCommand::Render(request))
            .map_err(|_| WorkerGone(self.worker_id))
    }

    /// Queue a benchmark run. The receiver resolves with the worker's
    /// reported compute time, or errors if the connection drops first.
    pub fn benchmark(&self, width: u32, height: u32) -> Result<oneshot::Receiver<u64>, WorkerGone> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerCommand::Benchmark {
                width,
                height,
                reply,
            })
            .map_err(|_| WorkerGone(self.worker_id))?;
        Ok(rx)
    }
}
