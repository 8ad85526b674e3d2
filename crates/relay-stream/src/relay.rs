use std::sync::Arc;

use relay_agent::{
    open_with_retry, AgentError, AgentStreamRequest, AgentStreamSource, RetryFailureKind,
    RetryOutcome, RetryPolicy,
};
use relay_routing::{NotConfiguredReason, RoutingDecision, RoutingError, RoutingResolver};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    consume_stream, ChatSink, DeliveryConfig, DeliveryPipeline, DeliveryReport,
    StreamConsumerConfig, StreamSummary,
};

const UNKNOWN_USER_NAME: &str = "Unknown";
const ROUTING_FAILURE_TEXT: &str =
    "❌ Error accessing your agent settings. Please ask the relay operator to check the routing configuration.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Platform-neutral inbound chat message.
pub struct InboundMessage {
    pub chat_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub retry: RetryPolicy,
    pub consumer: StreamConsumerConfig,
    pub delivery: DeliveryConfig,
    /// Wrap inbound text with the sender header and tool-use instruction.
    pub wrap_context: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            consumer: StreamConsumerConfig::default(),
            delivery: DeliveryConfig::default(),
            wrap_context: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Streamed {
        attempts: usize,
        summary: StreamSummary,
    },
    NotConfigured(NotConfiguredReason),
}

#[derive(Debug, Error)]
/// Request-level failures. The user has already been told by the time one is returned.
pub enum RelayError {
    #[error("routing lookup failed: {0}")]
    Routing(#[from] RoutingError),
    #[error("agent rejected request after {attempts} attempt(s): {source}")]
    AgentRejected {
        attempts: usize,
        #[source]
        source: AgentError,
    },
    #[error("agent unavailable after {retries} retries: {source}")]
    RetriesExhausted {
        retries: usize,
        #[source]
        source: AgentError,
    },
    #[error("agent stream failed: {0}")]
    StreamFailed(#[source] AgentError),
}

impl RelayError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Routing(_) => "relay_routing_failed",
            Self::AgentRejected { .. } => "relay_agent_rejected",
            Self::RetriesExhausted { .. } => "relay_retries_exhausted",
            Self::StreamFailed(_) => "relay_stream_failed",
        }
    }
}

/// Builds the text forwarded to the agent for one inbound message.
pub fn build_context_message(inbound: &InboundMessage) -> String {
    let user_name = inbound
        .user_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_USER_NAME);
    format!(
        "[Message from Telegram user {user_name} (chat_id: {})]\n\nIMPORTANT: Please respond to this message using the send_message tool.\n\n{}",
        inbound.chat_id, inbound.text
    )
}

pub fn retries_exhausted_text(retries: usize) -> String {
    format!(
        "Service temporarily unavailable after {retries} retries. Please try again in a few minutes."
    )
}

pub fn agent_error_text(error: &AgentError) -> String {
    format!("❌ Agent error: {}", error.user_detail())
}

pub fn stream_failure_text(error: &AgentError) -> String {
    format!(
        "❌ Error communicating with the agent: {}",
        error.user_detail()
    )
}

/// Routes one inbound message to its agent and streams the reply back to the chat.
///
/// Each call is an independent unit of work; concurrent calls share only the
/// source, sink and resolver handles.
pub struct MessageRelay {
    source: Arc<dyn AgentStreamSource>,
    sink: Arc<dyn ChatSink>,
    resolver: Arc<dyn RoutingResolver>,
    config: RelayConfig,
}

impl MessageRelay {
    pub fn new(
        source: Arc<dyn AgentStreamSource>,
        sink: Arc<dyn ChatSink>,
        resolver: Arc<dyn RoutingResolver>,
        config: RelayConfig,
    ) -> Self {
        Self {
            source,
            sink,
            resolver,
            config,
        }
    }

    pub fn sink(&self) -> &Arc<dyn ChatSink> {
        &self.sink
    }

    pub async fn handle_inbound(
        &self,
        inbound: &InboundMessage,
    ) -> Result<RelayOutcome, RelayError> {
        let chat_id = inbound.chat_id.as_str();
        let mut pipeline = self.pipeline(chat_id);

        let context = match self.resolver.resolve(chat_id, &inbound.user_id) {
            Ok(RoutingDecision::Resolved(context)) => context,
            Ok(RoutingDecision::NotConfigured(reason)) => {
                tracing::info!(
                    chat_id,
                    user_id = inbound.user_id.as_str(),
                    reason = reason.as_str(),
                    "routing not configured"
                );
                pipeline
                    .deliver_text("guidance", reason.guidance())
                    .await;
                return Ok(RelayOutcome::NotConfigured(reason));
            }
            Err(error) => {
                tracing::error!(chat_id, error = %error, "routing lookup failed");
                pipeline
                    .deliver_text("guidance", ROUTING_FAILURE_TEXT)
                    .await;
                return Err(error.into());
            }
        };

        let text = if self.config.wrap_context {
            build_context_message(inbound)
        } else {
            inbound.text.clone()
        };
        let request = AgentStreamRequest {
            credentials: context.credentials,
            agent_id: context.agent_id,
            project_id: context.project_id,
            text,
        };
        tracing::info!(
            chat_id,
            agent_id = request.agent_id.as_str(),
            agent_name = context.agent_name.as_deref().unwrap_or(""),
            "relaying message to agent"
        );

        let source = self.source.as_ref();
        let (stream, attempts) =
            match open_with_retry(&self.config.retry, |_| source.open_stream(&request)).await {
                RetryOutcome::Opened { value, attempts } => (value, attempts),
                RetryOutcome::Failed {
                    kind: RetryFailureKind::Exhausted,
                    error,
                    attempts,
                } => {
                    let retries = attempts.saturating_sub(1);
                    pipeline
                        .deliver_alert(&retries_exhausted_text(retries))
                        .await;
                    return Err(RelayError::RetriesExhausted {
                        retries,
                        source: error,
                    });
                }
                RetryOutcome::Failed {
                    kind: RetryFailureKind::Permanent,
                    error,
                    attempts,
                } => {
                    tracing::warn!(
                        chat_id,
                        reason_code = error.reason_code(),
                        http_status = ?error.http_status(),
                        error = %error,
                        "agent rejected request"
                    );
                    pipeline
                        .deliver_text("error", &agent_error_text(&error))
                        .await;
                    return Err(RelayError::AgentRejected {
                        attempts,
                        source: error,
                    });
                }
            };

        match consume_stream(stream, &mut pipeline, &self.config.consumer).await {
            Ok(summary) => {
                tracing::info!(
                    chat_id,
                    attempts,
                    end = summary.end.as_str(),
                    delivered_actions = summary.delivered_actions,
                    "agent response relayed"
                );
                Ok(RelayOutcome::Streamed { attempts, summary })
            }
            Err(error) => {
                tracing::error!(
                    chat_id,
                    reason_code = error.reason_code(),
                    error = %error,
                    "agent stream failed"
                );
                pipeline
                    .deliver_text("error", &stream_failure_text(&error))
                    .await;
                Err(RelayError::StreamFailed(error))
            }
        }
    }

    /// Sends operator-initiated text through the same split-and-order path.
    pub async fn send_proactive(&self, chat_id: &str, text: &str) -> DeliveryReport {
        self.pipeline(chat_id).deliver_text("proactive", text).await
    }

    fn pipeline(&self, chat_id: &str) -> DeliveryPipeline {
        DeliveryPipeline::new(self.sink.clone(), chat_id, self.config.delivery)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relay_agent::{AgentEvent, RetryPolicy};
    use relay_routing::NotConfiguredReason;

    use super::{
        build_context_message, InboundMessage, MessageRelay, RelayConfig, RelayError,
        RelayOutcome,
    };
    use crate::test_support::{
        unauthorized, unavailable, RecordingSink, ScriptStep, ScriptedSource, StaticResolver,
    };
    use crate::{DeliveryConfig, StreamConsumerConfig, StreamEnd};

    fn inbound(text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: "42".to_string(),
            user_id: "7".to_string(),
            user_name: Some("ada".to_string()),
            text: text.to_string(),
        }
    }

    fn fast_config() -> RelayConfig {
        RelayConfig {
            retry: RetryPolicy {
                max_retries: 3,
                base_delay_ms: 1,
                max_delay_ms: 2,
            },
            consumer: StreamConsumerConfig {
                global_timeout_ms: 5_000,
                inactivity_probe_ms: 5_000,
            },
            delivery: DeliveryConfig {
                max_message_bytes: 4_096,
                inter_chunk_delay_ms: 0,
            },
            wrap_context: true,
        }
    }

    fn relay(
        source: &Arc<ScriptedSource>,
        sink: &Arc<RecordingSink>,
        resolver: StaticResolver,
    ) -> MessageRelay {
        MessageRelay::new(
            source.clone(),
            sink.clone(),
            Arc::new(resolver),
            fast_config(),
        )
    }

    #[test]
    fn unit_context_message_names_sender_and_chat() {
        assert_eq!(
            build_context_message(&inbound("hi there")),
            "[Message from Telegram user ada (chat_id: 42)]\n\nIMPORTANT: Please respond to this message using the send_message tool.\n\nhi there"
        );
        let mut anonymous = inbound("x");
        anonymous.user_name = None;
        assert!(build_context_message(&anonymous).starts_with("[Message from Telegram user Unknown "));
    }

    #[tokio::test]
    async fn functional_resolved_message_streams_reply_to_chat() {
        let source = Arc::new(ScriptedSource::new(vec![
            ScriptStep::Event(AgentEvent::reasoning("user greets")),
            ScriptStep::Event(AgentEvent::assistant("Hello Ada!")),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let outcome = relay(&source, &sink, StaticResolver::resolved())
            .handle_inbound(&inbound("hi"))
            .await
            .expect("relay should succeed");

        match outcome {
            RelayOutcome::Streamed { attempts, summary } => {
                assert_eq!(attempts, 1);
                assert_eq!(summary.end, StreamEnd::Completed);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(
            sink.texts(),
            vec!["Reasoning:\n> user greets", "Hello Ada!"]
        );
        let requests = source.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].agent_id, "agent-1");
        assert!(requests[0].text.ends_with("\n\nhi"));
    }

    #[tokio::test]
    async fn functional_not_configured_sends_guidance_without_calling_agent() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let sink = Arc::new(RecordingSink::default());
        let outcome = relay(
            &source,
            &sink,
            StaticResolver::not_configured(NotConfiguredReason::MissingCredentials),
        )
        .handle_inbound(&inbound("hi"))
        .await
        .expect("not configured is not an error");

        assert_eq!(
            outcome,
            RelayOutcome::NotConfigured(NotConfiguredReason::MissingCredentials)
        );
        assert_eq!(source.opens(), 0);
        assert_eq!(sink.texts().len(), 1);
        assert!(sink.texts()[0].contains("Authentication required"));
    }

    #[tokio::test]
    async fn integration_transient_failures_exhaust_retries_with_one_alert() {
        let source = Arc::new(ScriptedSource::failing(usize::MAX, unavailable, Vec::new()));
        let sink = Arc::new(RecordingSink::default());
        let error = relay(&source, &sink, StaticResolver::resolved())
            .handle_inbound(&inbound("hi"))
            .await
            .expect_err("exhausted retries must surface");

        assert!(matches!(error, RelayError::RetriesExhausted { retries: 3, .. }));
        assert_eq!(source.opens(), 4);
        assert_eq!(
            sink.texts(),
            vec!["ℹ️ Service temporarily unavailable after 3 retries. Please try again in a few minutes."]
        );
    }

    #[tokio::test]
    async fn integration_transient_then_success_streams_normally() {
        let source = Arc::new(ScriptedSource::failing(
            2,
            unavailable,
            vec![ScriptStep::Event(AgentEvent::assistant("recovered"))],
        ));
        let sink = Arc::new(RecordingSink::default());
        let outcome = relay(&source, &sink, StaticResolver::resolved())
            .handle_inbound(&inbound("hi"))
            .await
            .expect("relay should recover");
        assert!(matches!(outcome, RelayOutcome::Streamed { attempts: 3, .. }));
        assert_eq!(sink.texts(), vec!["recovered"]);
    }

    #[tokio::test]
    async fn regression_permanent_failure_reports_detail_without_retry() {
        let source = Arc::new(ScriptedSource::failing(usize::MAX, unauthorized, Vec::new()));
        let sink = Arc::new(RecordingSink::default());
        let error = relay(&source, &sink, StaticResolver::resolved())
            .handle_inbound(&inbound("hi"))
            .await
            .expect_err("permanent failure must surface");
        assert!(matches!(error, RelayError::AgentRejected { attempts: 1, .. }));
        assert_eq!(source.opens(), 1);
        assert_eq!(sink.texts(), vec!["❌ Agent error: Invalid API key"]);
    }

    #[tokio::test]
    async fn regression_mid_stream_failure_is_reported_not_retried() {
        let source = Arc::new(ScriptedSource::new(vec![
            ScriptStep::Event(AgentEvent::assistant("partial answer")),
            ScriptStep::Fail(unavailable()),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let error = relay(&source, &sink, StaticResolver::resolved())
            .handle_inbound(&inbound("hi"))
            .await
            .expect_err("stream failure must surface");
        assert!(matches!(error, RelayError::StreamFailed(_)));
        assert_eq!(source.opens(), 1);
        let texts = sink.texts();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0], "partial answer");
        assert!(texts[1].starts_with("❌ Error communicating with the agent: HTTP 503"));
    }

    #[tokio::test]
    async fn functional_proactive_message_is_split_in_order() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let sink = Arc::new(RecordingSink::default());
        let mut config = fast_config();
        config.delivery.max_message_bytes = 8;
        let relay = MessageRelay::new(
            source.clone(),
            sink.clone(),
            Arc::new(StaticResolver::resolved()),
            config,
        );
        let report = relay.send_proactive("99", "one two three").await;
        assert_eq!(report.chunks_sent, 2);
        assert_eq!(sink.texts(), vec!["one two", "three"]);
        assert!(sink.sent().iter().all(|message| message.chat_id == "99"));
        assert_eq!(source.opens(), 0);
    }
}
