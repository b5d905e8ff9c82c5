//! Events emitted by worker connection tasks.
//!
//! Every connection task feeds one shared channel consumed by the
//! scheduler. Connection tasks never touch scheduler state directly; they
//! only describe what happened.

use tokio::sync::mpsc;
use zoomfarm_core::frame::Strip;
use zoomfarm_core::types::WorkerId;

use crate::handle::WorkerHandle;

/// Sending half of the scheduler's inbound event channel.
pub type EventSender = mpsc::UnboundedSender<WorkerEvent>;

/// Receiving half of the scheduler's inbound event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<WorkerEvent>;

/// A state change or message originating from one worker connection.
#[derive(Debug)]
pub enum WorkerEvent {
    /// A connection attempt has started.
    Connecting { worker_id: WorkerId },

    /// The connection is up; `handle` accepts outbound requests.
    Connected {
        worker_id: WorkerId,
        handle: WorkerHandle,
    },

    /// A connection attempt timed out or failed.
    ConnectFailed { worker_id: WorkerId, error: String },

    /// A previously connected worker went away.
    Disconnected { worker_id: WorkerId },

    /// A rendered strip arrived (already base64-decoded).
    StripArrived { worker_id: WorkerId, strip: Strip },

    /// The worker answered a render with a strip whose payload could not
    /// be decoded. It no longer owes that strip.
    MalformedStrip { worker_id: WorkerId, detail: String },

    /// The worker answered its current request with an error message.
    WorkerError { worker_id: WorkerId, message: String },

    /// The worker sent something that does not fit the protocol.
    ProtocolViolation { worker_id: WorkerId, detail: String },
}

impl WorkerEvent {
    pub fn worker_id(&self) -> WorkerId {
        match self {
            Self::Connecting { worker_id }
            | Self::Connected { worker_id, .. }
            | Self::ConnectFailed { worker_id, .. }
            | Self::Disconnected { worker_id }
            | Self::StripArrived { worker_id, .. }
            | Self::MalformedStrip { worker_id, .. }
            | Self::WorkerError { worker_id, .. }
            | Self::ProtocolViolation { worker_id, .. } => *worker_id,
        }
    }
}

/// Create the scheduler's inbound event channel.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
