use std::time::Duration;

use futures_util::StreamExt;
use relay_agent::{AgentError, AgentEventStream};
use tokio::time::{timeout_at, Instant};

use crate::{classify, DeliveryPipeline};

pub const DEFAULT_GLOBAL_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_INACTIVITY_PROBE_MS: u64 = 30_000;
pub const TIMEOUT_ALERT_TEXT: &str =
    "Response took too long and was terminated. Please try again with a simpler message.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConsumerConfig {
    /// Measured from the first received event, not from the call.
    pub global_timeout_ms: u64,
    pub inactivity_probe_ms: u64,
}

impl Default for StreamConsumerConfig {
    fn default() -> Self {
        Self {
            global_timeout_ms: DEFAULT_GLOBAL_TIMEOUT_MS,
            inactivity_probe_ms: DEFAULT_INACTIVITY_PROBE_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Completed,
    TimedOut,
}

impl StreamEnd {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub end: StreamEnd,
    pub events: usize,
    pub delivered_actions: usize,
    pub activity_signals: usize,
}

/// Timing state for one stream pass.
#[derive(Debug, Clone, Copy)]
struct StreamSession {
    first_event_at: Option<Instant>,
    // Last deliverable action or activity signal, whichever is newer.
    probe_anchor: Instant,
}

impl StreamSession {
    fn new() -> Self {
        Self {
            first_event_at: None,
            probe_anchor: Instant::now(),
        }
    }

    fn global_deadline(&self, config: &StreamConsumerConfig) -> Option<Instant> {
        self.first_event_at
            .map(|first| first + Duration::from_millis(config.global_timeout_ms))
    }

    fn probe_deadline(&self, config: &StreamConsumerConfig) -> Instant {
        self.probe_anchor + Duration::from_millis(config.inactivity_probe_ms.max(1))
    }

    fn timed_out(&self, config: &StreamConsumerConfig, now: Instant) -> bool {
        self.global_deadline(config)
            .is_some_and(|deadline| now >= deadline)
    }
}

/// Drives `stream` to completion, classifying and delivering each event
/// before pulling the next one.
///
/// Once the global timeout has elapsed the consumer sends one terminal alert
/// and stops; that is a normal end, not an error. Errors yielded by the
/// stream itself end the pass and are returned.
pub async fn consume_stream(
    mut stream: AgentEventStream,
    pipeline: &mut DeliveryPipeline,
    config: &StreamConsumerConfig,
) -> Result<StreamSummary, AgentError> {
    let mut session = StreamSession::new();
    let mut summary = StreamSummary {
        end: StreamEnd::Completed,
        events: 0,
        delivered_actions: 0,
        activity_signals: 0,
    };

    loop {
        let probe_deadline = session.probe_deadline(config);
        let wait_until = session
            .global_deadline(config)
            .map_or(probe_deadline, |deadline| deadline.min(probe_deadline));

        let next = match timeout_at(wait_until, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                let now = Instant::now();
                if session.timed_out(config, now) {
                    terminate_for_timeout(pipeline, &mut summary).await;
                    break;
                }
                signal_activity(pipeline, &mut session, &mut summary, now).await;
                continue;
            }
        };

        let event = match next {
            None => break,
            Some(Ok(event)) => event,
            Some(Err(error)) => {
                tracing::warn!(
                    chat_id = pipeline.chat_id(),
                    events = summary.events,
                    reason_code = error.reason_code(),
                    "agent stream failed mid-response"
                );
                return Err(error);
            }
        };

        let now = Instant::now();
        session.first_event_at.get_or_insert(now);
        if session.timed_out(config, now) {
            terminate_for_timeout(pipeline, &mut summary).await;
            break;
        }
        summary.events += 1;

        let action = classify(&event);
        tracing::debug!(
            chat_id = pipeline.chat_id(),
            message_type = event.message_type(),
            action = action.kind(),
            "classified agent event"
        );
        if action.is_ignore() {
            if now >= session.probe_deadline(config) {
                signal_activity(pipeline, &mut session, &mut summary, now).await;
            }
            continue;
        }
        pipeline.deliver(&action).await;
        summary.delivered_actions += 1;
        session.probe_anchor = Instant::now();
    }

    tracing::debug!(
        chat_id = pipeline.chat_id(),
        end = summary.end.as_str(),
        events = summary.events,
        delivered_actions = summary.delivered_actions,
        "agent stream finished"
    );
    Ok(summary)
}

async fn terminate_for_timeout(pipeline: &mut DeliveryPipeline, summary: &mut StreamSummary) {
    tracing::warn!(
        chat_id = pipeline.chat_id(),
        events = summary.events,
        "agent response exceeded global timeout; terminating stream"
    );
    pipeline.deliver_alert(TIMEOUT_ALERT_TEXT).await;
    summary.end = StreamEnd::TimedOut;
}

async fn signal_activity(
    pipeline: &DeliveryPipeline,
    session: &mut StreamSession,
    summary: &mut StreamSummary,
    now: Instant,
) {
    session.probe_anchor = now;
    summary.activity_signals += 1;
    if let Err(error) = pipeline.sink().signal_activity(pipeline.chat_id()).await {
        tracing::debug!(
            chat_id = pipeline.chat_id(),
            reason_code = error.reason_code.as_str(),
            "activity signal failed"
        );
    }
}
