use std::path::{Path, PathBuf};

use relay_agent::{AgentCredentials, DEFAULT_AGENT_API_BASE};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    write_text_atomic, NotConfiguredReason, RoutingContext, RoutingDecision, RoutingError,
    RoutingResolver,
};

const USERS_DIR: &str = "users";
const CHATS_DIR: &str = "chats";
const CREDENTIALS_FILE: &str = "credentials.json";
const AGENT_FILE: &str = "agent.json";
const PROJECT_FILE: &str = "project.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRoutingStoreConfig {
    pub state_dir: PathBuf,
    /// Agent used for chats without an `agent.json` record.
    pub default_agent_id: Option<String>,
    pub default_api_url: String,
}

impl FileRoutingStoreConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            default_agent_id: None,
            default_api_url: DEFAULT_AGENT_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserCredentialsRecord {
    pub api_key: String,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatAgentRecord {
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatProjectRecord {
    pub project_id: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Operator view of one chat/user pair. Never carries the API key.
pub struct RouteSummary {
    pub has_credentials: bool,
    pub api_url: Option<String>,
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    pub agent_is_default: bool,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone)]
/// JSON-file routing store laid out as `users/<user_id>/credentials.json`,
/// `chats/<chat_id>/agent.json` and `chats/<chat_id>/project.json`.
pub struct FileRoutingStore {
    config: FileRoutingStoreConfig,
}

impl FileRoutingStore {
    pub fn new(config: FileRoutingStoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FileRoutingStoreConfig {
        &self.config
    }

    pub fn store_credentials(
        &self,
        user_id: &str,
        api_key: &str,
        api_url: Option<&str>,
    ) -> Result<UserCredentialsRecord, RoutingError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(RoutingError::InvalidIdentifier {
                kind: "api key",
                value: String::new(),
            });
        }
        let path = self.credentials_path(user_id)?;
        let now = timestamp_now();
        let created_at = read_record::<UserCredentialsRecord>(&path)?
            .and_then(|existing| existing.created_at)
            .unwrap_or_else(|| now.clone());
        let record = UserCredentialsRecord {
            api_key: api_key.to_string(),
            api_url: normalize_optional(api_url),
            created_at: Some(created_at),
            updated_at: Some(now),
        };
        write_record(&path, &record)?;
        tracing::info!(user_id, "stored agent credentials");
        Ok(record)
    }

    pub fn load_credentials(
        &self,
        user_id: &str,
    ) -> Result<Option<UserCredentialsRecord>, RoutingError> {
        read_record(&self.credentials_path(user_id)?)
    }

    /// Returns whether a credentials record existed.
    pub fn delete_credentials(&self, user_id: &str) -> Result<bool, RoutingError> {
        let path = self.credentials_path(user_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(user_id, "deleted agent credentials");
                Ok(true)
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(RoutingError::Io { path, source }),
        }
    }

    pub fn save_chat_agent(
        &self,
        chat_id: &str,
        agent_id: &str,
        agent_name: Option<&str>,
    ) -> Result<ChatAgentRecord, RoutingError> {
        let agent_id = validate_identifier("agent", agent_id)?;
        let record = ChatAgentRecord {
            agent_id: agent_id.to_string(),
            agent_name: normalize_optional(agent_name),
            updated_at: Some(timestamp_now()),
        };
        write_record(&self.chat_path(chat_id, AGENT_FILE)?, &record)?;
        tracing::info!(chat_id, agent_id, "saved chat agent");
        Ok(record)
    }

    pub fn load_chat_agent(&self, chat_id: &str) -> Result<Option<ChatAgentRecord>, RoutingError> {
        read_record(&self.chat_path(chat_id, AGENT_FILE)?)
    }

    pub fn save_chat_project(
        &self,
        chat_id: &str,
        project_id: &str,
    ) -> Result<ChatProjectRecord, RoutingError> {
        let project_id = validate_identifier("project", project_id)?;
        let record = ChatProjectRecord {
            project_id: project_id.to_string(),
            updated_at: Some(timestamp_now()),
        };
        write_record(&self.chat_path(chat_id, PROJECT_FILE)?, &record)?;
        tracing::info!(chat_id, project_id, "saved chat project");
        Ok(record)
    }

    pub fn load_chat_project(
        &self,
        chat_id: &str,
    ) -> Result<Option<ChatProjectRecord>, RoutingError> {
        read_record(&self.chat_path(chat_id, PROJECT_FILE)?)
    }

    pub fn summarize(&self, chat_id: &str, user_id: &str) -> Result<RouteSummary, RoutingError> {
        let credentials = self.load_credentials(user_id)?;
        let chat_agent = self.load_chat_agent(chat_id)?;
        let default_agent = self.default_agent_id();
        let agent_is_default = chat_agent.is_none() && default_agent.is_some();
        Ok(RouteSummary {
            has_credentials: credentials.is_some(),
            api_url: credentials.map(|record| self.api_url_for(&record)),
            agent_name: chat_agent.as_ref().and_then(|record| record.agent_name.clone()),
            agent_id: chat_agent
                .map(|record| record.agent_id)
                .or_else(|| default_agent.map(str::to_string)),
            agent_is_default,
            project_id: self
                .load_chat_project(chat_id)?
                .map(|record| record.project_id),
        })
    }

    fn default_agent_id(&self) -> Option<&str> {
        self.config
            .default_agent_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn api_url_for(&self, record: &UserCredentialsRecord) -> String {
        record
            .api_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(self.config.default_api_url.as_str())
            .to_string()
    }

    fn credentials_path(&self, user_id: &str) -> Result<PathBuf, RoutingError> {
        let user_id = validate_identifier("user", user_id)?;
        Ok(self
            .config
            .state_dir
            .join(USERS_DIR)
            .join(user_id)
            .join(CREDENTIALS_FILE))
    }

    fn chat_path(&self, chat_id: &str, file: &str) -> Result<PathBuf, RoutingError> {
        let chat_id = validate_identifier("chat", chat_id)?;
        Ok(self.config.state_dir.join(CHATS_DIR).join(chat_id).join(file))
    }
}

impl RoutingResolver for FileRoutingStore {
    fn resolve(&self, chat_id: &str, user_id: &str) -> Result<RoutingDecision, RoutingError> {
        let Some(credentials) = self.load_credentials(user_id)? else {
            return Ok(RoutingDecision::NotConfigured(
                NotConfiguredReason::MissingCredentials,
            ));
        };
        let (agent_id, agent_name) = match self.load_chat_agent(chat_id)? {
            Some(record) => (record.agent_id, record.agent_name),
            None => match self.default_agent_id() {
                Some(agent_id) => {
                    tracing::debug!(chat_id, agent_id, "using default agent for chat");
                    (agent_id.to_string(), None)
                }
                None => {
                    return Ok(RoutingDecision::NotConfigured(
                        NotConfiguredReason::MissingAgent,
                    ))
                }
            },
        };
        let project_id = self
            .load_chat_project(chat_id)?
            .map(|record| record.project_id);
        Ok(RoutingDecision::Resolved(RoutingContext {
            credentials: AgentCredentials::new(
                credentials.api_key.clone(),
                self.api_url_for(&credentials),
            ),
            agent_id,
            agent_name,
            project_id,
        }))
    }
}

// Identifiers become path components; chat ids may be negative for groups.
fn validate_identifier<'a>(kind: &'static str, value: &'a str) -> Result<&'a str, RoutingError> {
    let trimmed = value.trim();
    let valid = !trimmed.is_empty()
        && trimmed.len() <= 128
        && trimmed != "."
        && trimmed != ".."
        && trimmed
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if valid {
        Ok(trimmed)
    } else {
        Err(RoutingError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        })
    }
}

fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, RoutingError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(RoutingError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| RoutingError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<(), RoutingError> {
    let mut encoded = serde_json::to_string_pretty(record)?;
    encoded.push('\n');
    write_text_atomic(path, &encoded)
}
