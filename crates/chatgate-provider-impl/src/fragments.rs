use std::collections::VecDeque;

use futures_util::StreamExt;
use futures_util::stream;

use chatgate_protocol::sse::{SseDecoder, SseEvent};
use chatgate_provider_core::{FragmentStream, ProviderError};

use crate::client::ByteStream;

/// What one decoded SSE event means for the fragment sequence.
#[derive(Debug)]
pub(crate) enum Frame {
    Text(String),
    Skip,
    Done,
    Fail(ProviderError),
}

pub(crate) type FrameParser = fn(&SseEvent) -> Frame;

struct State {
    body: ByteStream,
    decoder: SseDecoder,
    queued: VecDeque<SseEvent>,
    body_closed: bool,
    finished: bool,
}

/// Turns an upstream SSE body into text fragments using a family-specific
/// frame parser. The stream ends at the parser's terminator, at the first
/// failure, or when the body closes.
pub(crate) fn fragment_stream(body: ByteStream, parse: FrameParser) -> FragmentStream {
    let state = State {
        body,
        decoder: SseDecoder::new(),
        queued: VecDeque::new(),
        body_closed: false,
        finished: false,
    };

    stream::unfold(state, move |mut state| async move {
        loop {
            if state.finished {
                return None;
            }
            if let Some(event) = state.queued.pop_front() {
                match parse(&event) {
                    Frame::Text(text) if !text.is_empty() => return Some((Ok(text), state)),
                    Frame::Text(_) | Frame::Skip => continue,
                    Frame::Done => return None,
                    Frame::Fail(err) => {
                        state.finished = true;
                        return Some((Err(err), state));
                    }
                }
            }
            if state.body_closed {
                return None;
            }
            match state.body.recv().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.feed_bytes(&chunk);
                    state.queued.extend(events);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.body_closed = true;
                    let tail = state.decoder.finish();
                    state.queued.extend(tail);
                }
            }
        }
    })
    .boxed()
}

pub(crate) fn malformed(event: &SseEvent, err: serde_json::Error) -> Frame {
    let excerpt: String = event.data.chars().take(120).collect();
    Frame::Fail(ProviderError::Malformed(format!("{err}: {excerpt}")))
}
