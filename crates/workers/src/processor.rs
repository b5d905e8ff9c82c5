//! Per-connection session loop.
//!
//! Multiplexes outbound [`WorkerCommand`]s and inbound WebSocket frames on
//! a single task. Inbound text frames are parsed into [`WorkerReply`]s and
//! turned into [`WorkerEvent`]s for the scheduler; benchmark results are
//! routed to the oneshot that requested them.

use std::collections::VecDeque;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use zoomfarm_core::types::{FrameId, WorkerId};

use crate::client::WorkerStream;
use crate::events::{EventSender, WorkerEvent};
use crate::handle::WorkerCommand;
use crate::messages::{encode_request, parse_reply, WorkerReply};

/// A request written to the socket that the worker has not answered yet.
#[derive(Debug)]
enum Outstanding {
    Benchmark(oneshot::Sender<u64>),
    Render { frame_id: FrameId, y_start: u32 },
}

/// Requests in the order they were sent. Workers answer in order, so the
/// front entry is the one the next reply belongs to.
type OutstandingQueue = VecDeque<Outstanding>;

/// Remove the oldest outstanding render, skipping benchmarks still owed.
fn take_render(outstanding: &mut OutstandingQueue) -> Option<(FrameId, u32)> {
    let pos = outstanding
        .iter()
        .position(|entry| matches!(entry, Outstanding::Render { .. }))?;
    match outstanding.remove(pos) {
        Some(Outstanding::Render { frame_id, y_start }) => Some((frame_id, y_start)),
        _ => None,
    }
}

/// Remove the oldest outstanding benchmark, skipping renders still owed.
fn take_benchmark(outstanding: &mut OutstandingQueue) -> Option<oneshot::Sender<u64>> {
    let pos = outstanding
        .iter()
        .position(|entry| matches!(entry, Outstanding::Benchmark(_)))?;
    match outstanding.remove(pos) {
        Some(Outstanding::Benchmark(reply)) => Some(reply),
        _ => None,
    }
}

/// Drive one live connection until it closes.
///
/// Returns when the socket closes, a send or receive fails, every
/// [`WorkerHandle`](crate::handle::WorkerHandle) is dropped, or `cancel`
/// fires. The caller is responsible for reporting the disconnect.
pub async fn run_session(
    ws_stream: &mut WorkerStream,
    worker_id: WorkerId,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    events: &EventSender,
    cancel: &CancellationToken,
) {
    let mut outstanding = OutstandingQueue::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(worker_id = worker_id.0, "Session cancelled");
                let _ = ws_stream.close(None).await;
                break;
            }

            command = commands.recv() => {
                let Some(command) = command else {
                    tracing::debug!(worker_id = worker_id.0, "All handles dropped, closing session");
                    let _ = ws_stream.close(None).await;
                    break;
                };
                if !send_command(ws_stream, worker_id, command, &mut outstanding).await {
                    break;
                }
            }

            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_text_message(&text, worker_id, events, &mut outstanding);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::trace!(worker_id = worker_id.0, "Ignoring binary message");
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(worker_id = worker_id.0, ?frame, "Worker WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        tracing::error!(worker_id = worker_id.0, error = %e, "WebSocket receive error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

/// Write one command to the socket. Returns `false` if the socket is dead.
async fn send_command(
    ws_stream: &mut WorkerStream,
    worker_id: WorkerId,
    command: WorkerCommand,
    outstanding: &mut OutstandingQueue,
) -> bool {
    let body = match encode_request(&command.request()) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(worker_id = worker_id.0, error = %e, "Failed to encode request");
            return true;
        }
    };

    if let Err(e) = ws_stream.send(Message::Text(body)).await {
        tracing::error!(worker_id = worker_id.0, error = %e, "WebSocket send error");
        return false;
    }

    outstanding.push_back(match command {
        WorkerCommand::Benchmark { reply, .. } => Outstanding::Benchmark(reply),
        WorkerCommand::Render(req) => Outstanding::Render {
            frame_id: req.frame_id,
            y_start: req.y_start,
        },
    });
    true
}

/// Dispatch a single text frame.
fn handle_text_message(
    text: &str,
    worker_id: WorkerId,
    events: &EventSender,
    outstanding: &mut OutstandingQueue,
) {
    let reply = match parse_reply(text) {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(
                worker_id = worker_id.0,
                error = %e,
                raw_message = %text,
                "Failed to parse worker message",
            );
            return;
        }
    };

    match reply {
        WorkerReply::BenchmarkResult { compute_ms } => match take_benchmark(outstanding) {
            Some(reply) => {
                tracing::debug!(worker_id = worker_id.0, compute_ms, "Benchmark result");
                let _ = reply.send(compute_ms);
            }
            None => {
                let _ = events.send(WorkerEvent::ProtocolViolation {
                    worker_id,
                    detail: "unsolicited benchmark_result".to_string(),
                });
            }
        },
        WorkerReply::Strip(strip) => {
            let (frame_id, y_start, y_end) = (strip.frame_id, strip.y_start, strip.y_end);
            if take_render(outstanding).is_none() {
                tracing::debug!(worker_id = worker_id.0, frame_id, y_start, "Strip with no render outstanding");
            }
            match strip.into_strip() {
                Ok(strip) => {
                    tracing::trace!(
                        worker_id = worker_id.0,
                        frame_id,
                        y_start,
                        y_end,
                        "Strip received",
                    );
                    let _ = events.send(WorkerEvent::StripArrived { worker_id, strip });
                }
                Err(e) => {
                    tracing::warn!(
                        worker_id = worker_id.0,
                        frame_id,
                        y_start,
                        error = %e,
                        "Strip payload is not valid base64",
                    );
                    let _ = events.send(WorkerEvent::MalformedStrip {
                        worker_id,
                        detail: format!("strip {frame_id}@{y_start} has undecodable data: {e}"),
                    });
                }
            }
        }
        WorkerReply::Error { message } => match outstanding.pop_front() {
            // Dropping the reply resolves the benchmark as timed out.
            Some(Outstanding::Benchmark(_reply)) => {
                tracing::warn!(worker_id = worker_id.0, %message, "Worker failed a benchmark");
            }
            Some(Outstanding::Render { frame_id, y_start }) => {
                tracing::warn!(
                    worker_id = worker_id.0,
                    frame_id,
                    y_start,
                    %message,
                    "Worker failed a render",
                );
                let _ = events.send(WorkerEvent::WorkerError { worker_id, message });
            }
            None => {
                tracing::warn!(worker_id = worker_id.0, %message, "Worker reported an error");
                let _ = events.send(WorkerEvent::WorkerError { worker_id, message });
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use assert_matches::assert_matches;

    #[test]
    fn strip_reply_becomes_event() {
        let (tx, mut rx) = events::channel();
        let mut pending = OutstandingQueue::new();
        let text = r#"{"type":"strip","frame_id":9,"y_start":2,"y_end":3,"data":"AAAA"}"#;

        handle_text_message(text, WorkerId(1), &tx, &mut pending);

        assert_matches!(
            rx.try_recv().unwrap(),
            WorkerEvent::StripArrived { worker_id: WorkerId(1), strip } => {
                assert_eq!(strip.frame_id, 9);
                assert_eq!(strip.rows(), 2..3);
                assert_eq!(strip.pixels, vec![0, 0, 0]);
            }
        );
    }

    #[test]
    fn undecodable_strip_is_reported_as_malformed() {
        let (tx, mut rx) = events::channel();
        let mut pending = OutstandingQueue::new();
        let text = r#"{"type":"strip","frame_id":9,"y_start":2,"y_end":3,"data":"@@@"}"#;

        handle_text_message(text, WorkerId(1), &tx, &mut pending);

        assert_matches!(rx.try_recv().unwrap(), WorkerEvent::MalformedStrip { worker_id: WorkerId(1), .. });
    }

    #[test]
    fn benchmark_results_resolve_oldest_first() {
        let (tx, mut rx) = events::channel();
        let (first, mut first_result) = oneshot::channel();
        let (second, mut second_result) = oneshot::channel();
        let mut pending =
            OutstandingQueue::from([Outstanding::Benchmark(first), Outstanding::Benchmark(second)]);

        handle_text_message(
            r#"{"type":"benchmark_result","compute_ms":250}"#,
            WorkerId(0),
            &tx,
            &mut pending,
        );

        assert_eq!(pending.len(), 1);
        assert_eq!(first_result.try_recv().unwrap(), 250);
        assert!(second_result.try_recv().is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unsolicited_benchmark_result_is_flagged() {
        let (tx, mut rx) = events::channel();
        let mut pending = OutstandingQueue::new();

        handle_text_message(
            r#"{"type":"benchmark_result","compute_ms":250}"#,
            WorkerId(0),
            &tx,
            &mut pending,
        );

        assert_matches!(rx.try_recv().unwrap(), WorkerEvent::ProtocolViolation { .. });
    }

    #[test]
    fn error_reply_becomes_event() {
        let (tx, mut rx) = events::channel();
        let mut pending = OutstandingQueue::new();

        handle_text_message(r#"{"type":"error","message":"boom"}"#, WorkerId(2), &tx, &mut pending);

        assert_matches!(
            rx.try_recv().unwrap(),
            WorkerEvent::WorkerError { worker_id: WorkerId(2), message } if message == "boom"
        );
    }

    #[test]
    fn malformed_frame_is_ignored() {
        let (tx, mut rx) = events::channel();
        let mut pending = OutstandingQueue::new();

        handle_text_message("{{nope", WorkerId(0), &tx, &mut pending);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn error_for_pending_benchmark_fails_that_benchmark() {
        let (tx, mut rx) = events::channel();
        let (first, mut first_result) = oneshot::channel();
        let mut pending = OutstandingQueue::from([
            Outstanding::Benchmark(first),
            Outstanding::Render { frame_id: 4, y_start: 0 },
        ]);

        handle_text_message(r#"{"type":"error","message":"oom"}"#, WorkerId(0), &tx, &mut pending);

        // The benchmark resolves as dropped and the render is still owed.
        assert_matches!(first_result.try_recv(), Err(oneshot::error::TryRecvError::Closed));
        assert!(rx.try_recv().is_err());
        assert_matches!(pending.front(), Some(Outstanding::Render { frame_id: 4, y_start: 0 }));

        // A later benchmark gets its own result.
        let (second, mut second_result) = oneshot::channel();
        pending.push_back(Outstanding::Benchmark(second));
        handle_text_message(
            r#"{"type":"strip","frame_id":4,"y_start":0,"y_end":1,"data":"AAAA"}"#,
            WorkerId(0),
            &tx,
            &mut pending,
        );
        handle_text_message(
            r#"{"type":"benchmark_result","compute_ms":80}"#,
            WorkerId(0),
            &tx,
            &mut pending,
        );
        assert_matches!(rx.try_recv().unwrap(), WorkerEvent::StripArrived { .. });
        assert_eq!(second_result.try_recv().unwrap(), 80);
        assert!(pending.is_empty());
    }

    #[test]
    fn error_for_pending_render_is_a_strip_error() {
        let (tx, mut rx) = events::channel();
        let (bench, mut bench_result) = oneshot::channel();
        let mut pending = OutstandingQueue::from([
            Outstanding::Render { frame_id: 2, y_start: 10 },
            Outstanding::Benchmark(bench),
        ]);

        handle_text_message(r#"{"type":"error","message":"boom"}"#, WorkerId(1), &tx, &mut pending);

        assert_matches!(rx.try_recv().unwrap(), WorkerEvent::WorkerError { worker_id: WorkerId(1), .. });
        assert_matches!(bench_result.try_recv(), Err(oneshot::error::TryRecvError::Empty));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn strip_settles_the_oldest_render() {
        let (tx, _rx) = events::channel();
        let mut pending = OutstandingQueue::from([
            Outstanding::Render { frame_id: 1, y_start: 0 },
            Outstanding::Render { frame_id: 2, y_start: 0 },
        ]);

        handle_text_message(
            r#"{"type":"strip","frame_id":1,"y_start":0,"y_end":1,"data":"AAAA"}"#,
            WorkerId(0),
            &tx,
            &mut pending,
        );

        assert_matches!(pending.front(), Some(Outstanding::Render { frame_id: 2, .. }));
    }
}
