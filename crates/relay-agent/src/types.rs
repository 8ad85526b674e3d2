use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::AgentEvent;

pub const DEFAULT_AGENT_API_BASE: &str = "https://api.letta.com";

const USER_DETAIL_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Bearer token plus API base used to reach a user's agent backend.
pub struct AgentCredentials {
    pub token: String,
    pub base_url: String,
}

impl AgentCredentials {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One outbound request that opens an agent event stream.
pub struct AgentStreamRequest {
    pub credentials: AgentCredentials,
    pub agent_id: String,
    pub project_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Retry classification of an [`AgentError`].
pub enum AgentErrorClass {
    Transient,
    Permanent,
}

#[derive(Debug, Error)]
/// Failures raised while opening or iterating an agent stream.
pub enum AgentError {
    #[error("missing agent credentials")]
    MissingCredentials,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("agent returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("agent did not answer within {timeout_ms}ms")]
    RequestTimeout { timeout_ms: u64 },
    #[error("invalid agent stream: {0}")]
    InvalidStream(String),
    #[error("invalid agent client configuration: {0}")]
    InvalidConfig(String),
}

impl AgentError {
    /// Upstream 5xx, connect failures and timeouts before the response head
    /// are transient; everything else (4xx, auth, malformed payloads) is permanent.
    pub fn class(&self) -> AgentErrorClass {
        match self {
            Self::HttpStatus { status, .. } if (500..600).contains(status) => {
                AgentErrorClass::Transient
            }
            Self::Http(error) if error.is_connect() || error.is_timeout() => {
                AgentErrorClass::Transient
            }
            Self::RequestTimeout { .. } => AgentErrorClass::Transient,
            _ => AgentErrorClass::Permanent,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Http(error) => error.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "agent_missing_credentials",
            Self::Http(_) => "agent_transport_error",
            Self::HttpStatus { status, .. } if (500..600).contains(status) => {
                "agent_provider_unavailable"
            }
            Self::HttpStatus { .. } => "agent_request_rejected",
            Self::RequestTimeout { .. } => "agent_request_timeout",
            Self::InvalidStream(_) => "agent_invalid_stream",
            Self::InvalidConfig(_) => "agent_invalid_config",
        }
    }

    /// Short, user-presentable description. Prefers the `detail`, `message`
    /// or `error` field of a JSON error body over raw transport text.
    pub fn user_detail(&self) -> String {
        match self {
            Self::MissingCredentials => "no credentials configured for this user".to_string(),
            Self::Http(error) if error.is_timeout() => "the agent did not respond in time".to_string(),
            Self::RequestTimeout { .. } => "the agent did not respond in time".to_string(),
            Self::Http(error) if error.is_connect() => "could not connect to the agent".to_string(),
            Self::Http(_) => "connection to the agent failed".to_string(),
            Self::HttpStatus { status, body } => extract_error_body_detail(*status, body),
            Self::InvalidStream(_) => "the agent returned an unreadable response".to_string(),
            Self::InvalidConfig(_) => "the relay's agent client is misconfigured".to_string(),
        }
    }
}

fn extract_error_body_detail(status: u16, body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return format!("HTTP {status}: server returned an error");
    };
    for key in ["detail", "message", "error"] {
        match parsed.get(key) {
            Some(Value::String(text)) if !text.trim().is_empty() => {
                return text.trim().to_string();
            }
            Some(Value::Object(inner)) => {
                if let Some(text) = inner.get("message").and_then(Value::as_str) {
                    return text.trim().to_string();
                }
                return Value::Object(inner.clone()).to_string();
            }
            Some(Value::Null) | None => {}
            Some(other) if !other.is_string() => return other.to_string(),
            Some(_) => {}
        }
    }
    let mut excerpt = body.trim().chars().take(USER_DETAIL_BODY_LIMIT).collect::<String>();
    if body.trim().chars().count() > USER_DETAIL_BODY_LIMIT {
        excerpt.push_str("...");
    }
    format!("HTTP {status}: {excerpt}")
}

pub type AgentEventStream = Pin<Box<dyn Stream<Item = Result<AgentEvent, AgentError>> + Send>>;

#[async_trait]
/// Opens the event stream for one agent turn. Errors returned here happen
/// before any event was yielded; errors inside the stream are mid-iteration.
pub trait AgentStreamSource: Send + Sync {
    async fn open_stream(&self, request: &AgentStreamRequest)
        -> Result<AgentEventStream, AgentError>;
}
