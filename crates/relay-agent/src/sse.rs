//! Server-sent-event framing for agent streams.

use futures_util::{stream, Stream, StreamExt};
use serde_json::Value;

use crate::{AgentError, AgentEvent, AgentEventStream};

const SSE_DONE_MARKER: &str = "[DONE]";

struct SseDecoderState<S> {
    bytes: S,
    buffer: Vec<u8>,
    finished: bool,
}

/// Turns a raw byte stream of `data: <json>` frames into agent events.
///
/// Lines are split on `\n` before UTF-8 decoding so multi-byte characters may
/// straddle network chunks. Comment lines, `event:`/`id:` fields and blank
/// keep-alives are skipped; `data: [DONE]` ends the stream. A transport error
/// is yielded once and ends the stream.
pub fn decode_sse_event_stream<S, B, E>(bytes: S) -> AgentEventStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<AgentError> + Send + 'static,
{
    let state = SseDecoderState {
        bytes,
        buffer: Vec::new(),
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(position) = state.buffer.iter().position(|byte| *byte == b'\n') {
                let line = state.buffer.drain(..=position).collect::<Vec<_>>();
                match decode_line(&line) {
                    LineOutcome::Skip => continue,
                    LineOutcome::Done => {
                        state.finished = true;
                        state.buffer.clear();
                        return None;
                    }
                    LineOutcome::Event(item) => return Some((item, state)),
                }
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(error)) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(error.into()), state));
                }
                None => {
                    state.finished = true;
                    if state.buffer.iter().all(u8::is_ascii_whitespace) {
                        return None;
                    }
                    state.buffer.push(b'\n');
                }
            }
        }
    }))
}

enum LineOutcome {
    Skip,
    Done,
    Event(Result<AgentEvent, AgentError>),
}

fn decode_line(raw: &[u8]) -> LineOutcome {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim(),
        Err(error) => {
            return LineOutcome::Event(Err(AgentError::InvalidStream(format!(
                "invalid UTF-8 in agent stream: {error}"
            ))));
        }
    };
    let Some(data) = line.strip_prefix("data:") else {
        return LineOutcome::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        return LineOutcome::Skip;
    }
    if data == SSE_DONE_MARKER {
        return LineOutcome::Done;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(value) => LineOutcome::Event(Ok(AgentEvent::from_value(&value))),
        Err(error) => {
            tracing::warn!(
                error = %error,
                bytes = data.len(),
                "skipping undecodable agent stream frame"
            );
            LineOutcome::Event(Ok(AgentEvent::unknown(None)))
        }
    }
}
