//! Streaming core of the chat relay.
//!
//! Consumes an agent event stream, classifies each event, and delivers the
//! rendered text to a chat sink in order, split to the platform size limit.
mod classify;
mod consumer;
mod pipeline;
mod relay;
mod sink;
mod split;
#[cfg(test)]
mod test_support;

pub use classify::{blockquote, classify, ClassifiedAction};
pub use consumer::{
    consume_stream, StreamConsumerConfig, StreamEnd, StreamSummary, DEFAULT_GLOBAL_TIMEOUT_MS,
    DEFAULT_INACTIVITY_PROBE_MS, TIMEOUT_ALERT_TEXT,
};
pub use pipeline::{
    render_action, DeliveryConfig, DeliveryPipeline, DeliveryReport, ALERT_PREFIX,
    DEFAULT_INTER_CHUNK_DELAY_MS, DEFAULT_MAX_MESSAGE_BYTES,
};
pub use relay::{
    agent_error_text, build_context_message, retries_exhausted_text, stream_failure_text,
    InboundMessage, MessageRelay, RelayConfig, RelayError, RelayOutcome,
};
pub use sink::{ChatMessage, ChatSink, ChatSinkError};
pub use split::{split_message, MIN_SPLIT_BUDGET};
