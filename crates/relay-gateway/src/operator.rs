//! Operator commands that edit the routing state directory.
//!
//! Credentials and agent links are provisioned out of band; chat users never
//! send secrets through the chat itself.

use anyhow::{Context, Result};
use relay_routing::{FileRoutingStore, RoutingDecision, RoutingResolver};

use crate::cli::RelayCommand;

/// Runs one non-serve subcommand and returns the line to print.
pub fn execute_operator_command(store: &FileRoutingStore, command: &RelayCommand) -> Result<String> {
    match command {
        RelayCommand::Serve(_) => anyhow::bail!("serve is not an operator command"),
        RelayCommand::Login {
            user_id,
            api_key,
            api_url,
        } => {
            let record = store
                .store_credentials(user_id, api_key, api_url.as_deref())
                .with_context(|| format!("failed to store credentials for user {user_id}"))?;
            let api_url = record
                .api_url
                .as_deref()
                .unwrap_or(store.config().default_api_url.as_str());
            Ok(format!(
                "login: user_id={} status=stored api_url={api_url}",
                user_id.trim()
            ))
        }
        RelayCommand::Logout { user_id } => {
            let removed = store
                .delete_credentials(user_id)
                .with_context(|| format!("failed to remove credentials for user {user_id}"))?;
            let status = if removed { "removed" } else { "absent" };
            Ok(format!("logout: user_id={} status={status}", user_id.trim()))
        }
        RelayCommand::SetAgent {
            chat_id,
            agent_id,
            agent_name,
        } => {
            let record = store
                .save_chat_agent(chat_id, agent_id, agent_name.as_deref())
                .with_context(|| format!("failed to link chat {chat_id} to agent"))?;
            Ok(format!(
                "set-agent: chat_id={} agent_id={} agent_name={}",
                chat_id.trim(),
                record.agent_id,
                record.agent_name.as_deref().unwrap_or("none")
            ))
        }
        RelayCommand::SetProject {
            chat_id,
            project_id,
        } => {
            let record = store
                .save_chat_project(chat_id, project_id)
                .with_context(|| format!("failed to set project for chat {chat_id}"))?;
            Ok(format!(
                "set-project: chat_id={} project_id={}",
                chat_id.trim(),
                record.project_id
            ))
        }
        RelayCommand::ShowRoute { chat_id, user_id } => render_route(store, chat_id, user_id),
    }
}

fn render_route(store: &FileRoutingStore, chat_id: &str, user_id: &str) -> Result<String> {
    let summary = store
        .summarize(chat_id, user_id)
        .context("failed to read routing state")?;
    let decision = store
        .resolve(chat_id, user_id)
        .context("failed to resolve route")?;
    let status = match &decision {
        RoutingDecision::Resolved(_) => "resolved".to_string(),
        RoutingDecision::NotConfigured(reason) => format!("not_configured reason={}", reason.as_str()),
    };
    Ok(format!(
        "route: chat_id={} user_id={} status={status} credentials={} api_url={} agent_id={} agent_source={} project_id={}",
        chat_id.trim(),
        user_id.trim(),
        if summary.has_credentials { "present" } else { "missing" },
        summary.api_url.as_deref().unwrap_or("none"),
        summary.agent_id.as_deref().unwrap_or("none"),
        match (&summary.agent_id, summary.agent_is_default) {
            (None, _) => "none",
            (Some(_), true) => "default",
            (Some(_), false) => "chat",
        },
        summary.project_id.as_deref().unwrap_or("none"),
    ))
}
