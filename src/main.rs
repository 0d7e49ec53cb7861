use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use anichat::{serve, Agent, AppConfig, AppState, GeminiClient, Result};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("initializing, please wait...");

    let config_path =
        std::env::var("ANICHAT_CONFIG").unwrap_or_else(|_| "anichat.toml".to_string());
    let config = AppConfig::load(&config_path)?;

    let model = Arc::new(GeminiClient::from_config(&config.model)?);
    let tools = anichat::tools::anime_toolkit()?;
    let agent = Agent::new(model)
        .with_system_prompt(config.chat.system_prompt.clone())
        .with_tools(tools)
        .with_max_tool_rounds(config.chat.max_tool_rounds);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|err| anichat::ChatError::Protocol(format!("invalid bind address: {err}")))?;

    serve(AppState::new(agent), addr).await
}
