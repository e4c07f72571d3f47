use stock_market_assistant::{
    agents::{AgentFactory, OpenAiAgentFactory},
    config::Settings,
    graph::TurnGraph,
    state::{ConversationState, Tracer},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        eprintln!("usage: assistant <question>");
        std::process::exit(2);
    }

    let settings = Arc::new(Settings::from_env()?);
    let api_key = settings.resolve_api_key(None)?;

    info!(model = %settings.chat_model, "Stock market assistant starting");

    let factory = OpenAiAgentFactory::from_settings(settings.clone())?;
    let graph = TurnGraph::new(
        factory.build(&api_key)?,
        Tracer::new(settings.graph_tracing),
    );

    let state = ConversationState::next_turn(None, question, Some(api_key));

    match graph.run(state).await {
        Ok(final_state) => {
            println!("\n=== ANSWER ===\n");
            println!("{}", final_state.agent_response.unwrap_or_default());
            println!("\nExecution path:");
            for (i, label) in final_state.execution_path.iter().enumerate() {
                println!("  {}: {}", i + 1, label);
            }
            Ok(())
        }
        Err(failure) => {
            eprintln!("Turn failed at {}: {}", failure.node, failure.error);
            Err(failure.into())
        }
    }
}
