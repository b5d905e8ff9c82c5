//! In-process fake render worker.
//!
//! Speaks the worker wire protocol over a real WebSocket bound to an
//! ephemeral loopback port. Strips are filled with a constant byte so
//! assembled frames can be checked per worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use zoomfarm_workers::events::{EventReceiver, WorkerEvent};

/// How a fake worker answers requests.
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Reported benchmark compute time; `None` never answers.
    pub benchmark_ms: Option<u64>,
    /// Byte every rendered pixel channel is set to.
    pub fill: u8,
    /// Answer renders with `{"type":"error"}` instead of a strip.
    pub fail_renders: bool,
    /// Close the socket after this many renders on a connection.
    pub close_after_renders: Option<usize>,
    /// Keep the socket open but never answer renders.
    pub ignore_renders: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            benchmark_ms: Some(100),
            fill: 0xAA,
            fail_renders: false,
            close_after_renders: None,
            ignore_renders: false,
        }
    }
}

pub struct FakeWorker {
    pub endpoint: String,
    accepted: Arc<AtomicUsize>,
    _task: tokio::task::JoinHandle<()>,
}

impl FakeWorker {
    /// Number of TCP connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

pub async fn spawn_worker(behavior: Behavior) -> FakeWorker {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    let task = tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let behavior = behavior.clone();
            let counter = Arc::clone(&counter);
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                serve(ws, behavior).await;
            });
        }
    });

    FakeWorker {
        endpoint: format!("ws://{addr}/ws"),
        accepted,
        _task: task,
    }
}

async fn serve(
    mut ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    behavior: Behavior,
) {
    let mut renders = 0usize;

    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        let request: serde_json::Value = serde_json::from_str(&text).unwrap();

        match request["type"].as_str() {
            Some("benchmark") => {
                if let Some(ms) = behavior.benchmark_ms {
                    let reply = serde_json::json!({"type": "benchmark_result", "compute_ms": ms});
                    let _ = ws.send(Message::Text(reply.to_string())).await;
                }
            }
            Some("render") if behavior.ignore_renders => {}
            Some("render") => {
                renders += 1;
                let reply = if behavior.fail_renders {
                    serde_json::json!({"type": "error", "message": "render failed"})
                } else {
                    let width = request["width"].as_u64().unwrap() as usize;
                    let y_start = request["y_start"].as_u64().unwrap();
                    let y_end = request["y_end"].as_u64().unwrap();
                    let pixels = vec![behavior.fill; (y_end - y_start) as usize * width * 3];
                    let data = {
                        use base64::Engine;
                        base64::engine::general_purpose::STANDARD.encode(pixels)
                    };
                    serde_json::json!({
                        "type": "strip",
                        "frame_id": request["frame_id"],
                        "y_start": y_start,
                        "y_end": y_end,
                        "compute_ms": 1,
                        "data": data,
                    })
                };
                let _ = ws.send(Message::Text(reply.to_string())).await;

                if behavior.close_after_renders == Some(renders) {
                    let _ = ws.close(None).await;
                    return;
                }
            }
            _ => {}
        }
    }
}

/// Wait for the next event, failing the test after five seconds.
pub async fn next_event(rx: &mut EventReceiver) -> WorkerEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for worker event")
        .expect("event channel closed")
}
