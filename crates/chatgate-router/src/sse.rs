use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use chatgate_core::ChatEventStream;
use chatgate_protocol::sse::encode_data_frame;

const SSE_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const SSE_HEARTBEAT_FRAME: &[u8] = b": keep-alive\n\n";

pub fn sse_response(events: ChatEventStream) -> Response {
    let rx = relay_with_heartbeat(events, SSE_HEARTBEAT_INTERVAL);
    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| {
            (StatusCode::INTERNAL_SERVER_ERROR, "response_build_failed").into_response()
        })
}

/// Encodes chat events as `data:` frames, interleaving comment heartbeats.
/// Dropping the returned receiver drops `events`, which cancels the exchange.
fn relay_with_heartbeat(mut events: ChatEventStream, every: Duration) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel::<Bytes>(32);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First heartbeat goes out after one interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                maybe_event = events.next() => {
                    let Some(event) = maybe_event else {
                        break;
                    };
                    let frame = match encode_data_frame(&event) {
                        Ok(frame) => frame,
                        Err(err) => {
                            warn!(event = "sse_encode_failed", error = %err);
                            break;
                        }
                    };
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if tx.send(Bytes::from_static(SSE_HEARTBEAT_FRAME)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}
