//! In-process fake render workers for end-to-end tests.

use std::time::Duration;

use base64::Engine;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use zoomfarm_coordinator::config::CoordinatorConfig;

/// How a fake worker answers requests.
#[derive(Debug, Clone, Copy)]
pub struct Behavior {
    pub benchmark_ms: u64,
    /// Byte every rendered pixel channel is set to.
    pub fill: u8,
    /// Answer renders with an error instead of a strip.
    pub fail_renders: bool,
}

/// Bind a fake worker on an ephemeral port and return its endpoint.
pub async fn spawn_worker(behavior: Behavior) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if let Ok(ws) = tokio_tungstenite::accept_async(socket).await {
                    serve(ws, behavior).await;
                }
            });
        }
    });

    format!("ws://{addr}/ws")
}

/// An endpoint nothing listens on.
pub async fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/ws")
}

async fn serve(
    mut ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    behavior: Behavior,
) {
    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        let request: serde_json::Value = serde_json::from_str(&text).unwrap();

        let reply = match request["type"].as_str() {
            Some("benchmark") => {
                serde_json::json!({"type": "benchmark_result", "compute_ms": behavior.benchmark_ms})
            }
            Some("render") if behavior.fail_renders => {
                serde_json::json!({"type": "error", "message": "render failed"})
            }
            Some("render") => {
                let width = request["width"].as_u64().unwrap() as usize;
                let y_start = request["y_start"].as_u64().unwrap();
                let y_end = request["y_end"].as_u64().unwrap();
                let pixels = vec![behavior.fill; (y_end - y_start) as usize * width * 3];
                serde_json::json!({
                    "type": "strip",
                    "frame_id": request["frame_id"],
                    "y_start": y_start,
                    "y_end": y_end,
                    "data": base64::engine::general_purpose::STANDARD.encode(pixels),
                })
            }
            _ => continue,
        };

        if ws.send(Message::Text(reply.to_string())).await.is_err() {
            return;
        }
    }
}

/// A small, fast configuration pointed at `endpoints`.
pub fn test_config(endpoints: Vec<String>) -> CoordinatorConfig {
    let mut config = CoordinatorConfig::from_lookup(|_| None).unwrap();
    config.worker_count = endpoints.len();
    config.worker_endpoints = endpoints;
    config.frame_width = 8;
    config.frame_height = 60;
    config.tick_interval = Duration::from_millis(5);
    config.connect_timeout = Duration::from_secs(1);
    config.benchmark_timeout = Duration::from_secs(2);
    config.reconnect_delay = Duration::from_millis(100);
    config.frame_deadline = Some(Duration::from_millis(300));
    config
}
