//! Full relay path: file routing store, HTTP/SSE agent and Telegram Bot API,
//! with both remote ends served by mock servers.

use std::sync::Arc;

use httpmock::prelude::*;
use relay_agent::{AgentClientConfig, AgentHttpClient, RetryPolicy};
use relay_routing::{FileRoutingStore, FileRoutingStoreConfig, NotConfiguredReason};
use relay_stream::{
    DeliveryConfig, InboundMessage, MessageRelay, RelayConfig, RelayError, RelayOutcome,
};
use relay_telegram::{TelegramConfig, TelegramSink};
use serde_json::json;
use tempfile::TempDir;

const BOT_TOKEN: &str = "123:relay-token";
const SEND_MESSAGE_PATH: &str = "/bot123:relay-token/sendMessage";
const AGENT_STREAM_PATH: &str = "/v1/agents/agent-7/messages/stream";

struct RelayHarness {
    relay: MessageRelay,
    store: Arc<FileRoutingStore>,
    _state_dir: TempDir,
}

fn relay_harness(agent: &MockServer, telegram: &MockServer, retry: RetryPolicy) -> RelayHarness {
    let state_dir = tempfile::tempdir().expect("tempdir");
    let mut routing = FileRoutingStoreConfig::new(state_dir.path());
    routing.default_api_url = agent.base_url();
    let store = Arc::new(FileRoutingStore::new(routing));

    let source = AgentHttpClient::new(AgentClientConfig {
        request_timeout_ms: 5_000,
        ..AgentClientConfig::default()
    })
    .expect("agent client");
    let mut telegram_config = TelegramConfig::new(BOT_TOKEN);
    telegram_config.api_base = telegram.base_url();
    telegram_config.http_timeout_ms = 5_000;
    let sink = TelegramSink::new(telegram_config).expect("telegram sink");

    let config = RelayConfig {
        retry,
        delivery: DeliveryConfig {
            max_message_bytes: 4_096,
            inter_chunk_delay_ms: 0,
        },
        ..RelayConfig::default()
    };
    let relay = MessageRelay::new(Arc::new(source), Arc::new(sink), store.clone(), config);
    RelayHarness {
        relay,
        store,
        _state_dir: state_dir,
    }
}

fn fast_retry(max_retries: usize) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

fn configure_route(store: &FileRoutingStore) {
    store
        .store_credentials("55", "sk-live", None)
        .expect("credentials");
    store
        .save_chat_agent("42", "agent-7", Some("Helper"))
        .expect("chat agent");
}

fn inbound(text: &str) -> InboundMessage {
    InboundMessage {
        chat_id: "42".to_string(),
        user_id: "55".to_string(),
        user_name: Some("ada".to_string()),
        text: text.to_string(),
    }
}

#[tokio::test]
async fn integration_streamed_reply_is_classified_and_delivered_in_order() {
    let agent = MockServer::start();
    let telegram = MockServer::start();
    let harness = relay_harness(&agent, &telegram, fast_retry(2));
    configure_route(&harness.store);
    harness
        .store
        .save_chat_project("42", "proj-1")
        .expect("project");

    let stream_body = concat!(
        "data: {\"message_type\":\"reasoning_message\",\"reasoning\":\"checking memory\"}\n\n",
        "data: {\"message_type\":\"ping\"}\n\n",
        "data: {\"message_type\":\"tool_call_message\",\"tool_call\":{\"name\":\"archival_memory_search\",\"arguments\":\"{\\\"query\\\":\\\"weather\\\"}\"}}\n\n",
        "data: {\"message_type\":\"tool_return_message\",\"tool_return\":\"ok\"}\n\n",
        "data: {\"message_type\":\"assistant_message\",\"content\":\"It is sunny today\"}\n\n",
        "data: [DONE]\n\n",
    );
    let agent_mock = agent.mock(|when, then| {
        when.method(POST)
            .path(AGENT_STREAM_PATH)
            .header("authorization", "Bearer sk-live")
            .header("x-project", "proj-1")
            .body_includes("[Message from Telegram user ada (chat_id: 42)]")
            .body_includes("what is the weather");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(stream_body);
    });
    let reasoning = telegram.mock(|when, then| {
        when.method(POST)
            .path(SEND_MESSAGE_PATH)
            .body_includes("Reasoning")
            .body_includes("checking memory");
        then.status(200).json_body(json!({"ok": true, "result": {}}));
    });
    let tool = telegram.mock(|when, then| {
        when.method(POST)
            .path(SEND_MESSAGE_PATH)
            .body_includes("*Remembering* `weather`");
        then.status(200).json_body(json!({"ok": true, "result": {}}));
    });
    let reply = telegram.mock(|when, then| {
        when.method(POST)
            .path(SEND_MESSAGE_PATH)
            .body_includes("It is sunny today");
        then.status(200).json_body(json!({"ok": true, "result": {}}));
    });

    let outcome = harness
        .relay
        .handle_inbound(&inbound("what is the weather"))
        .await
        .expect("relay should succeed");

    agent_mock.assert();
    reasoning.assert_calls(1);
    tool.assert_calls(1);
    reply.assert_calls(1);
    match outcome {
        RelayOutcome::Streamed { attempts, summary } => {
            assert_eq!(attempts, 1);
            assert_eq!(summary.delivered_actions, 3);
            assert_eq!(summary.events, 5);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn integration_long_reply_is_split_under_the_message_limit() {
    let agent = MockServer::start();
    let telegram = MockServer::start();
    let harness = relay_harness(&agent, &telegram, fast_retry(0));
    configure_route(&harness.store);

    let long_reply = "lorem ".repeat(1_000);
    let stream_body = format!(
        "data: {}\n\ndata: [DONE]\n\n",
        json!({"message_type": "assistant_message", "content": long_reply})
    );
    agent.mock(|when, then| {
        when.method(POST).path(AGENT_STREAM_PATH);
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(stream_body);
    });
    let chunks = telegram.mock(|when, then| {
        when.method(POST)
            .path(SEND_MESSAGE_PATH)
            .body_includes("lorem lorem");
        then.status(200).json_body(json!({"ok": true, "result": {}}));
    });

    harness
        .relay
        .handle_inbound(&inbound("tell me a story"))
        .await
        .expect("relay should succeed");
    chunks.assert_calls(2);
}

#[tokio::test]
async fn integration_missing_credentials_sends_guidance_without_agent_call() {
    let agent = MockServer::start();
    let telegram = MockServer::start();
    let harness = relay_harness(&agent, &telegram, fast_retry(2));

    let agent_mock = agent.mock(|when, then| {
        when.method(POST);
        then.status(200);
    });
    let guidance = telegram.mock(|when, then| {
        when.method(POST)
            .path(SEND_MESSAGE_PATH)
            .body_includes("Authentication required");
        then.status(200).json_body(json!({"ok": true, "result": {}}));
    });

    let outcome = harness
        .relay
        .handle_inbound(&inbound("hello"))
        .await
        .expect("not configured is not an error");
    assert_eq!(
        outcome,
        RelayOutcome::NotConfigured(NotConfiguredReason::MissingCredentials)
    );
    guidance.assert_calls(1);
    agent_mock.assert_calls(0);
}

#[tokio::test]
async fn regression_unavailable_agent_exhausts_retries_with_single_alert() {
    let agent = MockServer::start();
    let telegram = MockServer::start();
    let harness = relay_harness(&agent, &telegram, fast_retry(2));
    configure_route(&harness.store);

    let agent_mock = agent.mock(|when, then| {
        when.method(POST).path(AGENT_STREAM_PATH);
        then.status(503).body("upstream overloaded");
    });
    let alert = telegram.mock(|when, then| {
        when.method(POST)
            .path(SEND_MESSAGE_PATH)
            .body_includes("Service temporarily unavailable after 2 retries");
        then.status(200).json_body(json!({"ok": true, "result": {}}));
    });

    let error = harness
        .relay
        .handle_inbound(&inbound("hello"))
        .await
        .expect_err("retries should be exhausted");
    assert!(matches!(error, RelayError::RetriesExhausted { retries: 2, .. }));
    agent_mock.assert_calls(3);
    alert.assert_calls(1);
}

#[tokio::test]
async fn regression_rejected_credentials_are_reported_once_without_retry() {
    let agent = MockServer::start();
    let telegram = MockServer::start();
    let harness = relay_harness(&agent, &telegram, fast_retry(3));
    configure_route(&harness.store);

    let agent_mock = agent.mock(|when, then| {
        when.method(POST).path(AGENT_STREAM_PATH);
        then.status(401)
            .json_body(json!({"detail": "Invalid API key"}));
    });
    let report = telegram.mock(|when, then| {
        when.method(POST)
            .path(SEND_MESSAGE_PATH)
            .body_includes("Agent error: Invalid API key");
        then.status(200).json_body(json!({"ok": true, "result": {}}));
    });

    let error = harness
        .relay
        .handle_inbound(&inbound("hello"))
        .await
        .expect_err("401 is permanent");
    assert!(matches!(error, RelayError::AgentRejected { attempts: 1, .. }));
    agent_mock.assert_calls(1);
    report.assert_calls(1);
}
