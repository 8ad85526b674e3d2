use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use relay_agent::{
    AgentCredentials, AgentError, AgentEvent, AgentEventStream, AgentStreamRequest,
    AgentStreamSource,
};
use relay_routing::{
    NotConfiguredReason, RoutingContext, RoutingDecision, RoutingError, RoutingResolver,
};

use crate::{ChatMessage, ChatSink, ChatSinkError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SinkCall {
    Send(ChatMessage),
    Activity(String),
}

#[derive(Default)]
/// Records every sink call; sends whose 1-based index is listed in
/// `fail_sends` are rejected.
pub(crate) struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    attempts: AtomicUsize,
    fail_sends: Vec<usize>,
}

impl RecordingSink {
    pub(crate) fn failing_on(fail_sends: &[usize]) -> Self {
        Self {
            fail_sends: fail_sends.to_vec(),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub(crate) fn sent(&self) -> Vec<ChatMessage> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Send(message) => Some(message),
                SinkCall::Activity(_) => None,
            })
            .collect()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|message| message.text).collect()
    }

    pub(crate) fn activity_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, SinkCall::Activity(_)))
            .count()
    }
}

#[async_trait]
impl ChatSink for RecordingSink {
    async fn send(&self, message: &ChatMessage) -> Result<(), ChatSinkError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_sends.contains(&attempt) {
            return Err(
                ChatSinkError::new("delivery_request_rejected", "chat not found", false)
                    .with_http_status(400),
            );
        }
        self.calls
            .lock()
            .expect("sink lock")
            .push(SinkCall::Send(message.clone()));
        Ok(())
    }

    async fn signal_activity(&self, chat_id: &str) -> Result<(), ChatSinkError> {
        self.calls
            .lock()
            .expect("sink lock")
            .push(SinkCall::Activity(chat_id.to_string()));
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) enum ScriptStep {
    Event(AgentEvent),
    Fail(AgentError),
    Pause(Duration),
}

/// Builds an event stream that replays `steps`, sleeping on `Pause`.
pub(crate) fn scripted_stream(steps: Vec<ScriptStep>) -> AgentEventStream {
    Box::pin(stream::unfold(
        VecDeque::from(steps),
        |mut steps| async move {
            loop {
                match steps.pop_front()? {
                    ScriptStep::Pause(duration) => tokio::time::sleep(duration).await,
                    ScriptStep::Event(event) => return Some((Ok(event), steps)),
                    ScriptStep::Fail(error) => return Some((Err(error), steps)),
                }
            }
        },
    ))
}

/// Agent source that fails the first `failures` opens with `failure`, then
/// hands out a stream built from `steps`.
pub(crate) struct ScriptedSource {
    failures: usize,
    failure: fn() -> AgentError,
    steps: Mutex<Option<Vec<ScriptStep>>>,
    opens: AtomicUsize,
    requests: Mutex<Vec<AgentStreamRequest>>,
}

impl ScriptedSource {
    pub(crate) fn new(steps: Vec<ScriptStep>) -> Self {
        Self::failing(0, unavailable, steps)
    }

    pub(crate) fn failing(
        failures: usize,
        failure: fn() -> AgentError,
        steps: Vec<ScriptStep>,
    ) -> Self {
        Self {
            failures,
            failure,
            steps: Mutex::new(Some(steps)),
            opens: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<AgentStreamRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl AgentStreamSource for ScriptedSource {
    async fn open_stream(
        &self,
        request: &AgentStreamRequest,
    ) -> Result<AgentEventStream, AgentError> {
        let open = self.opens.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        if open < self.failures {
            return Err((self.failure)());
        }
        let steps = self
            .steps
            .lock()
            .expect("steps lock")
            .take()
            .unwrap_or_default();
        Ok(scripted_stream(steps))
    }
}

pub(crate) fn unavailable() -> AgentError {
    AgentError::HttpStatus {
        status: 503,
        body: "upstream unavailable".to_string(),
    }
}

pub(crate) fn unauthorized() -> AgentError {
    AgentError::HttpStatus {
        status: 401,
        body: r#"{"detail":"Invalid API key"}"#.to_string(),
    }
}

pub(crate) struct StaticResolver(pub(crate) Result<RoutingDecision, String>);

impl StaticResolver {
    pub(crate) fn resolved() -> Self {
        Self(Ok(RoutingDecision::Resolved(RoutingContext {
            credentials: AgentCredentials::new("sk-test", "http://agent.invalid"),
            agent_id: "agent-1".to_string(),
            agent_name: Some("Helper".to_string()),
            project_id: None,
        })))
    }

    pub(crate) fn not_configured(reason: NotConfiguredReason) -> Self {
        Self(Ok(RoutingDecision::NotConfigured(reason)))
    }
}

impl RoutingResolver for StaticResolver {
    fn resolve(&self, _chat_id: &str, _user_id: &str) -> Result<RoutingDecision, RoutingError> {
        match &self.0 {
            Ok(decision) => Ok(decision.clone()),
            Err(message) => Err(RoutingError::InvalidPath(message.clone())),
        }
    }
}
