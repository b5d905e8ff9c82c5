//! Worker wire protocol.
//!
//! Every message is a JSON text frame tagged by a `"type"` field, e.g.
//! `{"type":"benchmark","width":512,"height":512}`. The coordinator sends
//! [`WorkerRequest`]s and the worker answers each one with exactly one
//! [`WorkerReply`].

use base64::Engine;
use serde::{Deserialize, Serialize};
use zoomfarm_core::frame::{Frame, Strip};
use zoomfarm_core::types::FrameId;

/// Messages from the coordinator to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Render the fixed reference workload and report how long it took.
    Benchmark { width: u32, height: u32 },
    /// Render rows `[y_start, y_end)` of a frame.
    Render(RenderRequest),
}

/// Parameters for one strip render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub frame_id: FrameId,
    pub width: u32,
    pub y_start: u32,
    pub y_end: u32,
    pub total_height: u32,
    pub center_x: f64,
    pub center_y: f64,
    pub zoom: f64,
    pub max_iterations: u32,
}

impl RenderRequest {
    /// Build the request for rows `[y_start, y_end)` of `frame`.
    pub fn for_strip(frame: &Frame, y_start: u32, y_end: u32) -> Self {
        Self {
            frame_id: frame.id,
            width: frame.width,
            y_start,
            y_end,
            total_height: frame.height,
            center_x: frame.viewport.center_x,
            center_y: frame.viewport.center_y,
            zoom: frame.viewport.zoom,
            max_iterations: frame.viewport.max_iterations,
        }
    }
}

/// Messages from a worker to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
    /// Result of a [`WorkerRequest::Benchmark`].
    BenchmarkResult { compute_ms: u64 },
    /// A rendered strip.
    Strip(StripReply),
    /// The worker could not satisfy its current request.
    Error { message: String },
}

/// Payload of a rendered strip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripReply {
    pub frame_id: FrameId,
    pub y_start: u32,
    pub y_end: u32,
    /// Worker-side render time; informational only.
    #[serde(default)]
    pub compute_ms: u64,
    /// Base64-encoded row-major RGB.
    pub data: String,
}

impl StripReply {
    /// Encode raw RGB rows into a reply.
    pub fn encode(frame_id: FrameId, y_start: u32, y_end: u32, pixels: &[u8]) -> Self {
        Self {
            frame_id,
            y_start,
            y_end,
            compute_ms: 0,
            data: base64::engine::general_purpose::STANDARD.encode(pixels),
        }
    }

    /// Decode the transport encoding into a [`Strip`].
    pub fn into_strip(self) -> Result<Strip, base64::DecodeError> {
        let pixels = base64::engine::general_purpose::STANDARD.decode(self.data.as_bytes())?;
        Ok(Strip {
            frame_id: self.frame_id,
            row_start: self.y_start,
            row_end: self.y_end,
            pixels,
        })
    }
}

/// Parse a worker text frame into a typed reply.
///
/// Returns `Err` for malformed JSON or unknown `type` values. Callers
/// should log and continue.
pub fn parse_reply(text: &str) -> Result<WorkerReply, serde_json::Error> {
    serde_json::from_str(text)
}

/// Serialize a request into a text frame body.
pub fn encode_request(request: &WorkerRequest) -> Result<String, serde_json::Error> {
    serde_json::to_string(request)
}
