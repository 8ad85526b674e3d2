//! Agent backend surface for the chat relay.
//!
//! Decodes the loosely-typed agent event stream into [`AgentEvent`] values,
//! opens streams over HTTP/SSE, and wraps stream establishment with bounded
//! exponential-backoff retry.
mod client;
mod event;
mod retry;
mod sse;
mod types;

pub use client::{AgentClientConfig, AgentHttpClient};
pub use event::{AgentEvent, ToolCallDescriptor};
pub use retry::{
    backoff_delay_ms, new_request_id, open_with_retry, RetryFailureKind, RetryOutcome,
    RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_RETRIES,
};
pub use sse::decode_sse_event_stream;
pub use types::{
    AgentCredentials, AgentError, AgentErrorClass, AgentEventStream, AgentStreamRequest,
    AgentStreamSource, DEFAULT_AGENT_API_BASE,
};
