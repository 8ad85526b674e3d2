use std::path::PathBuf;

use relay_agent::AgentCredentials;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Credentials, agent and project resolved once per inbound message.
pub struct RoutingContext {
    pub credentials: AgentCredentials,
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which piece of routing state is missing for a chat.
pub enum NotConfiguredReason {
    MissingCredentials,
    MissingAgent,
}

impl NotConfiguredReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::MissingAgent => "missing_agent",
        }
    }

    /// Plain-text guidance sent back to the chat.
    pub fn guidance(self) -> &'static str {
        match self {
            Self::MissingCredentials => {
                "❌ Authentication required.\n\nNo agent API key is registered for your account. Ask the relay operator to run `login` with your user id and API key."
            }
            Self::MissingAgent => {
                "❌ No agent configured.\n\nThis chat is not linked to an agent yet. Ask the relay operator to run `set-agent` for this chat."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outcome of a routing lookup. `NotConfigured` is an expected state, not an error.
pub enum RoutingDecision {
    Resolved(RoutingContext),
    NotConfigured(NotConfiguredReason),
}

#[derive(Debug, Error)]
/// Failures reading or writing routing state.
pub enum RoutingError {
    #[error("invalid {kind} identifier '{value}'")]
    InvalidIdentifier { kind: &'static str, value: String },
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse routing record {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode routing record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Resolves the routing context for one inbound message.
pub trait RoutingResolver: Send + Sync {
    fn resolve(&self, chat_id: &str, user_id: &str) -> Result<RoutingDecision, RoutingError>;
}
