use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use relay_agent::{
    AgentClientConfig, RetryPolicy, DEFAULT_AGENT_API_BASE, DEFAULT_BASE_DELAY_MS,
    DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_RETRIES,
};
use relay_routing::FileRoutingStoreConfig;
use relay_stream::{
    DeliveryConfig, RelayConfig, StreamConsumerConfig, DEFAULT_GLOBAL_TIMEOUT_MS,
    DEFAULT_INACTIVITY_PROBE_MS, DEFAULT_INTER_CHUNK_DELAY_MS, DEFAULT_MAX_MESSAGE_BYTES,
};
use relay_telegram::{TelegramConfig, DEFAULT_TELEGRAM_API_BASE};

const DEFAULT_AGENT_REQUEST_TIMEOUT_MS: u64 = 360_000;
const DEFAULT_TELEGRAM_HTTP_TIMEOUT_MS: u64 = 10_000;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "chat-relay",
    about = "Relay Telegram chats to streaming conversational agents",
    version
)]
pub struct Cli {
    #[arg(
        long = "state-dir",
        env = "RELAY_STATE_DIR",
        default_value = ".relay",
        help = "Directory holding per-user credentials and per-chat agent routing"
    )]
    pub state_dir: PathBuf,

    #[arg(
        long = "default-agent-id",
        env = "LETTA_AGENT_ID",
        help = "Agent used for chats that have no agent of their own"
    )]
    pub default_agent_id: Option<String>,

    #[arg(
        long = "agent-api-base",
        env = "RELAY_AGENT_API_BASE",
        default_value = DEFAULT_AGENT_API_BASE,
        help = "Agent API base URL used when a user's credentials do not name one"
    )]
    pub agent_api_base: String,

    #[command(subcommand)]
    pub command: RelayCommand,
}

impl Cli {
    pub fn routing_store_config(&self) -> FileRoutingStoreConfig {
        FileRoutingStoreConfig {
            state_dir: self.state_dir.clone(),
            default_agent_id: self
                .default_agent_id
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            default_api_url: self.agent_api_base.trim().to_string(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum RelayCommand {
    /// Run the webhook server.
    Serve(ServeArgs),
    /// Store agent API credentials for a chat user.
    Login {
        #[arg(long = "user-id")]
        user_id: String,
        #[arg(long = "api-key", env = "RELAY_LOGIN_API_KEY", hide_env_values = true)]
        api_key: String,
        #[arg(long = "api-url")]
        api_url: Option<String>,
    },
    /// Remove a user's stored credentials.
    Logout {
        #[arg(long = "user-id")]
        user_id: String,
    },
    /// Link a chat to an agent.
    SetAgent {
        #[arg(long = "chat-id", allow_hyphen_values = true)]
        chat_id: String,
        #[arg(long = "agent-id")]
        agent_id: String,
        #[arg(long = "agent-name")]
        agent_name: Option<String>,
    },
    /// Scope a chat's agent requests to a project.
    SetProject {
        #[arg(long = "chat-id", allow_hyphen_values = true)]
        chat_id: String,
        #[arg(long = "project-id")]
        project_id: String,
    },
    /// Print how a message from `user-id` in `chat-id` would be routed.
    ShowRoute {
        #[arg(long = "chat-id", allow_hyphen_values = true)]
        chat_id: String,
        #[arg(long = "user-id")]
        user_id: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[arg(long, env = "RELAY_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    #[arg(long = "telegram-bot-token", env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_bot_token: String,

    #[arg(
        long = "telegram-api-base",
        env = "RELAY_TELEGRAM_API_BASE",
        default_value = DEFAULT_TELEGRAM_API_BASE
    )]
    pub telegram_api_base: String,

    #[arg(
        long = "telegram-http-timeout-ms",
        env = "RELAY_TELEGRAM_HTTP_TIMEOUT_MS",
        default_value_t = DEFAULT_TELEGRAM_HTTP_TIMEOUT_MS,
        value_parser = parse_positive_u64
    )]
    pub telegram_http_timeout_ms: u64,

    #[arg(
        long = "telegram-plain-text",
        env = "RELAY_TELEGRAM_PLAIN_TEXT",
        default_value_t = false,
        help = "Send replies as plain text instead of MarkdownV2"
    )]
    pub telegram_plain_text: bool,

    #[arg(
        long = "webhook-secret",
        env = "RELAY_WEBHOOK_SECRET",
        hide_env_values = true,
        help = "Expected X-Telegram-Bot-Api-Secret-Token header value"
    )]
    pub webhook_secret: Option<String>,

    #[arg(
        long = "proactive-token",
        env = "RELAY_PROACTIVE_TOKEN",
        hide_env_values = true,
        help = "Bearer token required by POST /proactive"
    )]
    pub proactive_token: Option<String>,

    #[arg(
        long = "agent-request-timeout-ms",
        env = "RELAY_AGENT_REQUEST_TIMEOUT_MS",
        default_value_t = DEFAULT_AGENT_REQUEST_TIMEOUT_MS,
        value_parser = parse_positive_u64,
        help = "Deadline for reaching the agent and receiving response headers; the streamed reply is bounded by --global-timeout-ms"
    )]
    pub agent_request_timeout_ms: u64,

    #[arg(long = "max-retries", env = "RELAY_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "RELAY_RETRY_BASE_DELAY_MS",
        default_value_t = DEFAULT_BASE_DELAY_MS
    )]
    pub retry_base_delay_ms: u64,

    #[arg(
        long = "retry-max-delay-ms",
        env = "RELAY_RETRY_MAX_DELAY_MS",
        default_value_t = DEFAULT_MAX_DELAY_MS
    )]
    pub retry_max_delay_ms: u64,

    #[arg(
        long = "global-timeout-ms",
        env = "RELAY_GLOBAL_TIMEOUT_MS",
        default_value_t = DEFAULT_GLOBAL_TIMEOUT_MS,
        value_parser = parse_positive_u64
    )]
    pub global_timeout_ms: u64,

    #[arg(
        long = "inactivity-probe-ms",
        env = "RELAY_INACTIVITY_PROBE_MS",
        default_value_t = DEFAULT_INACTIVITY_PROBE_MS,
        value_parser = parse_positive_u64
    )]
    pub inactivity_probe_ms: u64,

    #[arg(
        long = "max-message-bytes",
        env = "RELAY_MAX_MESSAGE_BYTES",
        default_value_t = DEFAULT_MAX_MESSAGE_BYTES,
        value_parser = parse_positive_usize
    )]
    pub max_message_bytes: usize,

    #[arg(
        long = "inter-chunk-delay-ms",
        env = "RELAY_INTER_CHUNK_DELAY_MS",
        default_value_t = DEFAULT_INTER_CHUNK_DELAY_MS
    )]
    pub inter_chunk_delay_ms: u64,

    #[arg(
        long = "no-context-wrap",
        env = "RELAY_NO_CONTEXT_WRAP",
        default_value_t = false,
        help = "Forward message text as-is instead of wrapping it with sender context"
    )]
    pub no_context_wrap: bool,
}

impl ServeArgs {
    pub fn agent_client_config(&self) -> AgentClientConfig {
        AgentClientConfig {
            request_timeout_ms: self.agent_request_timeout_ms,
            ..AgentClientConfig::default()
        }
    }

    pub fn telegram_config(&self) -> TelegramConfig {
        TelegramConfig {
            api_base: self.telegram_api_base.trim().to_string(),
            bot_token: self.telegram_bot_token.trim().to_string(),
            http_timeout_ms: self.telegram_http_timeout_ms,
            max_message_bytes: self.max_message_bytes,
            markdown: !self.telegram_plain_text,
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay_ms: self.retry_base_delay_ms,
                max_delay_ms: self.retry_max_delay_ms,
            },
            consumer: StreamConsumerConfig {
                global_timeout_ms: self.global_timeout_ms,
                inactivity_probe_ms: self.inactivity_probe_ms,
            },
            delivery: DeliveryConfig {
                max_message_bytes: self.max_message_bytes,
                inter_chunk_delay_ms: self.inter_chunk_delay_ms,
            },
            wrap_context: !self.no_context_wrap,
        }
    }
}
