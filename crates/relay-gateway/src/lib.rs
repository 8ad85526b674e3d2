//! Chat relay binary surface: CLI, webhook server and operator commands.

mod api_error;
pub mod cli;
pub mod operator;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use relay_agent::AgentHttpClient;
use relay_routing::FileRoutingStore;
use relay_stream::MessageRelay;
use relay_telegram::TelegramSink;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub use cli::{Cli, RelayCommand, ServeArgs};
pub use operator::execute_operator_command;
pub use server::{
    build_gateway_router, run_gateway_server, GatewayServerConfig, GatewayState,
};

pub fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

pub async fn run_cli(cli: Cli) -> Result<()> {
    let store = FileRoutingStore::new(cli.routing_store_config());
    match &cli.command {
        RelayCommand::Serve(args) => serve(store, args).await,
        command => {
            let output = execute_operator_command(&store, command)?;
            println!("{output}");
            Ok(())
        }
    }
}

async fn serve(store: FileRoutingStore, args: &ServeArgs) -> Result<()> {
    if args.telegram_bot_token.trim().is_empty() {
        anyhow::bail!("--telegram-bot-token (or TELEGRAM_BOT_TOKEN) must not be empty");
    }
    let source = AgentHttpClient::new(args.agent_client_config())
        .context("failed to build agent HTTP client")?;
    let sink =
        TelegramSink::new(args.telegram_config()).context("failed to build Telegram client")?;
    tracing::info!(
        state_dir = %store.config().state_dir.display(),
        default_agent = store.config().default_agent_id.is_some(),
        max_retries = args.max_retries,
        global_timeout_ms = args.global_timeout_ms,
        "starting chat relay"
    );
    let relay = MessageRelay::new(
        Arc::new(source),
        Arc::new(sink),
        Arc::new(store),
        args.relay_config(),
    );
    let state = Arc::new(GatewayState::new(
        Arc::new(relay),
        GatewayServerConfig {
            bind: args.bind.clone(),
            webhook_secret: args.webhook_secret.clone(),
            proactive_token: args.proactive_token.clone(),
        },
    ));
    run_gateway_server(state).await
}
