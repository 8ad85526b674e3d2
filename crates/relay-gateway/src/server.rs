//! Webhook server: Telegram updates in, background relay tasks out.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_stream::{ChatMessage, InboundMessage, MessageRelay};
use relay_telegram::{parse_telegram_update, TelegramUpdate};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::api_error::GatewayApiError;

pub const TELEGRAM_WEBHOOK_ENDPOINT: &str = "/telegram/webhook";
pub const HEALTH_ENDPOINT: &str = "/health";
pub const PROACTIVE_ENDPOINT: &str = "/proactive";
pub const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";
pub const SERVICE_NAME: &str = "chat-relay";
pub const COMMAND_REPLY_TEXT: &str = "Commands are not handled in chat. Ask the relay operator to set up your credentials and agent with the `chat-relay` CLI, then just send a message.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayServerConfig {
    pub bind: String,
    pub webhook_secret: Option<String>,
    pub proactive_token: Option<String>,
}

pub struct GatewayState {
    relay: Arc<MessageRelay>,
    config: GatewayServerConfig,
}

impl GatewayState {
    pub fn new(relay: Arc<MessageRelay>, config: GatewayServerConfig) -> Self {
        Self { relay, config }
    }
}

#[derive(Debug, Deserialize)]
struct ProactiveRequest {
    chat_id: Value,
    message: String,
}

pub fn build_gateway_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route(TELEGRAM_WEBHOOK_ENDPOINT, post(handle_telegram_webhook))
        .route(HEALTH_ENDPOINT, get(handle_health))
        .route(PROACTIVE_ENDPOINT, post(handle_proactive))
        .with_state(state)
}

pub async fn run_gateway_server(state: Arc<GatewayState>) -> Result<()> {
    let bind_addr = state
        .config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{}'", state.config.bind))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind relay server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound relay server address")?;
    tracing::info!(
        addr = %local_addr,
        webhook = TELEGRAM_WEBHOOK_ENDPOINT,
        webhook_secret = state.config.webhook_secret.is_some(),
        proactive_auth = state.config.proactive_token.is_some(),
        "relay server listening"
    );

    let app = build_gateway_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("relay server exited unexpectedly")?;
    tracing::info!("relay server stopped");
    Ok(())
}

async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn handle_telegram_webhook(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(update): Json<Value>,
) -> Result<Json<Value>, GatewayApiError> {
    if let Some(expected) = configured(&state.config.webhook_secret) {
        let observed = headers
            .get(TELEGRAM_SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if observed != Some(expected) {
            tracing::warn!("rejected webhook call with missing or wrong secret token");
            return Err(GatewayApiError::forbidden(
                "invalid_webhook_secret",
                "webhook secret token mismatch",
            ));
        }
    }

    // Telegram redelivers on non-2xx, so unreadable updates are acknowledged.
    let update = match parse_telegram_update(&update) {
        Ok(update) => update,
        Err(error) => {
            tracing::warn!(
                reason_code = error.reason_code,
                error = %error,
                "ignoring malformed telegram update"
            );
            return Ok(Json(json!({"ok": true, "status": "ignored", "reason": error.reason_code})));
        }
    };

    match update {
        TelegramUpdate::Ignored { reason } => {
            tracing::debug!(reason, "ignoring telegram update");
            Ok(Json(json!({"ok": true, "status": "ignored", "reason": reason})))
        }
        TelegramUpdate::Command { name, message } => {
            tracing::info!(
                chat_id = message.chat_id.as_str(),
                command = name.as_str(),
                "answering chat command with operator pointer"
            );
            let relay = Arc::clone(&state.relay);
            tokio::spawn(async move {
                let reply = ChatMessage::new(message.chat_id, COMMAND_REPLY_TEXT);
                if let Err(error) = relay.sink().send(&reply).await {
                    tracing::warn!(
                        chat_id = reply.chat_id.as_str(),
                        reason_code = error.reason_code.as_str(),
                        "failed to answer chat command"
                    );
                }
            });
            Ok(Json(json!({"ok": true, "status": "command"})))
        }
        TelegramUpdate::Message(message) => {
            accept_message(&state, message).await;
            Ok(Json(json!({"ok": true, "status": "accepted"})))
        }
    }
}

async fn accept_message(state: &Arc<GatewayState>, message: InboundMessage) {
    tracing::info!(
        chat_id = message.chat_id.as_str(),
        user_id = message.user_id.as_str(),
        "accepted chat message"
    );
    if let Err(error) = state.relay.sink().signal_activity(&message.chat_id).await {
        tracing::debug!(
            chat_id = message.chat_id.as_str(),
            reason_code = error.reason_code.as_str(),
            "typing indicator failed"
        );
    }
    let relay = Arc::clone(&state.relay);
    tokio::spawn(async move {
        if let Err(error) = relay.handle_inbound(&message).await {
            tracing::warn!(
                chat_id = message.chat_id.as_str(),
                reason_code = error.reason_code(),
                error = %error,
                "chat message relay failed"
            );
        }
    });
}

async fn handle_proactive(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(request): Json<ProactiveRequest>,
) -> Result<Json<Value>, GatewayApiError> {
    if let Some(expected) = configured(&state.config.proactive_token) {
        if bearer_token_from_headers(&headers).as_deref() != Some(expected) {
            return Err(GatewayApiError::unauthorized());
        }
    }
    let chat_id = match &request.chat_id {
        Value::String(raw) => raw.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    };
    if chat_id.is_empty() {
        return Err(GatewayApiError::bad_request(
            "missing_chat_id",
            "chat_id must be a non-empty string or number",
        ));
    }
    if request.message.trim().is_empty() {
        return Err(GatewayApiError::bad_request(
            "missing_message",
            "message must not be empty",
        ));
    }

    let report = state.relay.send_proactive(&chat_id, &request.message).await;
    if let Some(error) = report.error.as_ref().filter(|_| report.chunks_sent == 0) {
        return Err(GatewayApiError::gateway_failure(
            "delivery_failed",
            format!("chat delivery failed: {}", error.reason_code),
        ));
    }
    Ok(Json(json!({
        "ok": report.error.is_none(),
        "chat_id": chat_id,
        "chunk_count": report.chunk_count,
        "chunks_sent": report.chunks_sent,
    })))
}

fn configured(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn bearer_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}
