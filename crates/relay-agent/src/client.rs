use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::{
    decode_sse_event_stream, new_request_id, AgentError, AgentEventStream, AgentStreamRequest,
    AgentStreamSource,
};

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 360_000;
const DEFAULT_USER_AGENT: &str = "chat-relay";

#[derive(Debug, Clone)]
/// HTTP settings for [`AgentHttpClient`].
pub struct AgentClientConfig {
    /// Bounds connecting and receiving the response head. The streamed body
    /// has no transport deadline; the stream consumer bounds it.
    pub request_timeout_ms: u64,
    pub include_pings: bool,
    pub user_agent: String,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            include_pings: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
/// Streams agent turns from `{base_url}/v1/agents/{agent_id}/messages/stream`.
///
/// Credentials travel with each request because they are resolved per user;
/// the underlying connection pool is shared.
pub struct AgentHttpClient {
    client: reqwest::Client,
    config: AgentClientConfig,
}

impl AgentHttpClient {
    pub fn new(config: AgentClientConfig) -> Result<Self, AgentError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(config.user_agent.trim()).map_err(|error| {
                AgentError::InvalidConfig(format!("invalid user agent header: {error}"))
            })?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;
        Ok(Self { client, config })
    }

    fn stream_url(base_url: &str, agent_id: &str) -> String {
        format!(
            "{}/v1/agents/{}/messages/stream",
            base_url.trim().trim_end_matches('/'),
            agent_id.trim()
        )
    }

    fn request_body(&self, text: &str) -> Value {
        json!({
            "messages": [{
                "role": "user",
                "content": [{"type": "text", "text": text}],
            }],
            "include_pings": self.config.include_pings,
        })
    }
}

#[async_trait]
impl AgentStreamSource for AgentHttpClient {
    async fn open_stream(
        &self,
        request: &AgentStreamRequest,
    ) -> Result<AgentEventStream, AgentError> {
        let token = request.credentials.token.trim();
        if token.is_empty() || request.credentials.base_url.trim().is_empty() {
            return Err(AgentError::MissingCredentials);
        }

        let url = Self::stream_url(&request.credentials.base_url, &request.agent_id);
        let request_id = new_request_id();
        tracing::debug!(
            agent_id = request.agent_id.as_str(),
            request_id = request_id.as_str(),
            "opening agent stream"
        );
        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("x-relay-request-id", request_id);
        if let Some(project_id) = request
            .project_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            builder = builder.header("X-Project", project_id);
        }

        let timeout_ms = self.config.request_timeout_ms.max(1);
        let response = timeout(
            Duration::from_millis(timeout_ms),
            builder.json(&self.request_body(&request.text)).send(),
        )
        .await
        .map_err(|_| AgentError::RequestTimeout { timeout_ms })??;
        let status = response.status();
        if !status.is_success() {
            let body = timeout(Duration::from_millis(timeout_ms), response.text())
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            return Err(AgentError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(decode_sse_event_stream(Box::pin(response.bytes_stream())))
    }
}
