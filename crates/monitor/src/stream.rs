//! Server-sent-events decoding for execution streams.
//!
//! The engine pushes one JSON [`ProgressEvent`] per SSE `data` field.
//! [`sse_frames`] turns a streaming HTTP response into raw text frames,
//! [`next_frame`] applies the optional idle watchdog, and [`decode_frame`]
//! parses a frame, logging and skipping anything malformed.

use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::{future, StreamExt};

use cadence_core::events::{parse_event, ProgressEvent};
use cadence_core::types::ExecutionId;

use crate::backend::{EventStream, StreamError};

/// Decode a streaming `text/event-stream` response into text frames.
///
/// Frames with empty data (keep-alives) are skipped. Dropping the returned
/// stream drops the response and closes the connection.
pub fn sse_frames(response: reqwest::Response) -> EventStream {
    response
        .bytes_stream()
        .eventsource()
        .filter_map(|event| {
            future::ready(match event {
                Ok(event) if event.data.trim().is_empty() => None,
                Ok(event) => Some(Ok(event.data)),
                Err(e) => Some(Err(StreamError::Transport(e.to_string()))),
            })
        })
        .boxed()
}

/// Wait for the next frame, giving up after `idle_timeout` of silence.
///
/// Returns `None` once the stream is exhausted.
pub async fn next_frame(
    stream: &mut EventStream,
    idle_timeout: Option<Duration>,
) -> Option<Result<String, StreamError>> {
    match idle_timeout {
        None => stream.next().await,
        Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
            Ok(frame) => frame,
            Err(_) => Some(Err(StreamError::Idle(limit))),
        },
    }
}

/// Parse one frame, logging and discarding it if it is not a known event.
pub fn decode_frame(execution_id: &ExecutionId, text: &str) -> Option<ProgressEvent> {
    match parse_event(text) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(
                execution_id = %execution_id,
                error = %e,
                raw_frame = %text,
                "Failed to parse execution stream event",
            );
            None
        }
    }
}
