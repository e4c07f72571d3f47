use stock_market_assistant::{
    agents::OpenAiAgentFactory,
    api::{start_server, ApiState},
    audit::AuditLog,
    config::Settings,
    state::InMemorySessionStore,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Arc::new(Settings::from_env()?);

    if settings.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY not set, every chat request must carry an api_key");
    }

    info!("Stock Market Assistant - API Server");
    info!("Port: {}", settings.api_port);

    let state = ApiState {
        settings: settings.clone(),
        agents: Arc::new(OpenAiAgentFactory::from_settings(settings.clone())?),
        sessions: Arc::new(InMemorySessionStore::new()),
        audit: Arc::new(AuditLog::new()),
    };

    start_server(state, settings.api_port).await?;

    Ok(())
}
