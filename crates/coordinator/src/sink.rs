//! Destinations for assembled frames.
//!
//! The scheduler hands every completed frame to one [`FrameSink`]. Sinks
//! must not block the scheduler for long and must never fail it.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use zoomfarm_core::frame::AssembledFrame;

/// Consumer of completed frames, in completion order.
pub trait FrameSink: Send {
    fn present(&mut self, frame: AssembledFrame);
}

/// Errors writing a frame to disk.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Frame {frame_id} buffer does not match {width}x{height} RGB")]
    Geometry {
        frame_id: u64,
        width: u32,
        height: u32,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Forwards frames to an async consumer.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AssembledFrame>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AssembledFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FrameSink for ChannelSink {
    fn present(&mut self, frame: AssembledFrame) {
        if self.tx.send(frame).is_err() {
            tracing::debug!("Frame receiver dropped, discarding frame");
        }
    }
}

// ---------------------------------------------------------------------------
// Counting
// ---------------------------------------------------------------------------

/// Logs and discards every frame.
#[derive(Debug, Default)]
pub struct CountingSink {
    presented: u64,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl FrameSink for CountingSink {
    fn present(&mut self, frame: AssembledFrame) {
        self.presented += 1;
        tracing::debug!(
            frame_id = frame.frame.id,
            zoom = frame.frame.viewport.zoom,
            elapsed_ms = frame.elapsed.as_millis() as u64,
            "Frame presented",
        );
    }
}

// ---------------------------------------------------------------------------
// PNG sequence
// ---------------------------------------------------------------------------

/// Writes every `every`-th presented frame to `dir/frame_<id>.png`.
///
/// Encoding runs on the blocking pool; failures are logged.
pub struct PngSequenceSink {
    dir: PathBuf,
    every: u64,
    presented: u64,
}

impl PngSequenceSink {
    /// Create the sink, making `dir` if it does not exist.
    pub fn new(dir: PathBuf, every: u64) -> Result<Self, SinkError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            every: every.max(1),
            presented: 0,
        })
    }
}

impl FrameSink for PngSequenceSink {
    fn present(&mut self, frame: AssembledFrame) {
        self.presented += 1;
        if (self.presented - 1) % self.every != 0 {
            return;
        }

        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || match write_png(&dir, &frame) {
            Ok(path) => tracing::info!(
                frame_id = frame.frame.id,
                path = %path.display(),
                "Frame saved",
            ),
            Err(e) => tracing::warn!(frame_id = frame.frame.id, error = %e, "Failed to save frame"),
        });
    }
}

/// Encode one frame as `dir/frame_<id>.png`.
pub fn write_png(dir: &Path, frame: &AssembledFrame) -> Result<PathBuf, SinkError> {
    let geometry = SinkError::Geometry {
        frame_id: frame.frame.id,
        width: frame.frame.width,
        height: frame.frame.height,
    };
    if frame.pixels.len() != frame.frame.frame_bytes() {
        return Err(geometry);
    }

    let image = image::RgbImage::from_raw(frame.frame.width, frame.frame.height, frame.pixels.clone())
        .ok_or(geometry)?;

    let path = dir.join(format!("frame_{:06}.png", frame.frame.id));
    image.save(&path)?;
    Ok(path)
}
