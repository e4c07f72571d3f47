//! The five reasoning agents
//!
//! Each agent reads the conversation state, renders its prompt, calls the
//! gateway and returns its output. Writing the output back into the state
//! is the graph's job.

use crate::config::Settings;
use crate::llm::{pooled_client, LlmGateway, OpenAiGateway};
use crate::retrieval::{InMemoryVectorStore, OpenAiEmbedder, PgVectorStore, RetrievalEngine, VectorStore};
use crate::tools::{create_research_registry, MarketSearch, SerpApiClient, ToolRegistry};
use crate::Result;
use reqwest::Client;
use std::sync::Arc;
use tracing::{info, warn};

mod finalizer;
mod investment;
mod rag_caller;
mod research;
mod router;

pub use finalizer::FinalAnswer;
pub use rag_caller::parse_rag_decision;
pub use research::MAX_TOOL_ROUNDS;

/// Collaborator handles shared by every agent for one turn
pub struct AgentSet {
    gateway: Arc<dyn LlmGateway>,
    retrieval: RetrievalEngine,
    tools: ToolRegistry,
    require_tool_call: bool,
}

impl AgentSet {
    pub fn new(gateway: Arc<dyn LlmGateway>, retrieval: RetrievalEngine, tools: ToolRegistry) -> Self {
        Self {
            gateway,
            retrieval,
            tools,
            require_tool_call: true,
        }
    }

    /// Whether the research agent must see at least one tool result before answering
    pub fn with_required_tool_call(mut self, required: bool) -> Self {
        self.require_tool_call = required;
        self
    }

    /// Build the OpenAI-backed agent set for one credential on a shared client
    pub fn from_settings(
        settings: &Settings,
        client: &Client,
        api_key: &str,
        store: Arc<dyn VectorStore>,
        market_search: Option<Arc<dyn MarketSearch>>,
    ) -> Self {
        let gateway: Arc<dyn LlmGateway> = Arc::new(OpenAiGateway::from_settings(
            settings,
            client.clone(),
            api_key.to_string(),
        ));
        let embedder = Arc::new(OpenAiEmbedder::from_settings(
            settings,
            client.clone(),
            api_key.to_string(),
        ));

        let retrieval = RetrievalEngine::new(
            gateway.clone(),
            embedder,
            store,
            settings.retrieval_concurrency,
        );

        Self::new(gateway, retrieval, create_research_registry(market_search))
            .with_required_tool_call(settings.require_research_tool_call)
    }

    pub fn gateway(&self) -> &Arc<dyn LlmGateway> {
        &self.gateway
    }
}

/// Builds the agent set for a turn from the credential resolved for it
pub trait AgentFactory: Send + Sync {
    fn build(&self, api_key: &str) -> Result<AgentSet>;
}

/// OpenAI-backed factory sharing one HTTP client, vector store and market search
pub struct OpenAiAgentFactory {
    settings: Arc<Settings>,
    client: Client,
    store: Arc<dyn VectorStore>,
    market_search: Option<Arc<dyn MarketSearch>>,
}

impl OpenAiAgentFactory {
    pub fn new(
        settings: Arc<Settings>,
        store: Arc<dyn VectorStore>,
        market_search: Option<Arc<dyn MarketSearch>>,
    ) -> Result<Self> {
        Ok(Self {
            settings,
            client: pooled_client()?,
            store,
            market_search,
        })
    }

    /// Wire the pgvector store and SerpAPI client described by `settings`.
    /// Without a connection string retrieval runs over an empty in-memory store.
    pub fn from_settings(settings: Arc<Settings>) -> Result<Self> {
        let store: Arc<dyn VectorStore> = match settings.pg_connection_string.as_deref() {
            Some(conn) => {
                info!(table = %settings.vector_table, "Using pgvector store");
                Arc::new(PgVectorStore::connect_lazy(conn, &settings.vector_table)?)
            }
            None => {
                warn!("PG_CONNECTION_STRING not set, retrieval will return no passages");
                Arc::new(InMemoryVectorStore::new())
            }
        };

        let market_search: Option<Arc<dyn MarketSearch>> = match SerpApiClient::from_settings(&settings) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, "Market research tool unavailable");
                None
            }
        };

        Self::new(settings, store, market_search)
    }
}

impl AgentFactory for OpenAiAgentFactory {
    fn build(&self, api_key: &str) -> Result<AgentSet> {
        Ok(AgentSet::from_settings(
            &self.settings,
            &self.client,
            api_key,
            self.store.clone(),
            self.market_search.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmMessage, LlmRequest};
    use axum::extract::{ConnectInfo, State};
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use tokio_test::assert_ok;

    type Seen = Arc<Mutex<Vec<(SocketAddr, String)>>>;

    async fn completions(
        State(seen): State<Seen>,
        ConnectInfo(peer): ConnectInfo<SocketAddr>,
        headers: HeaderMap,
    ) -> Json<Value> {
        let auth = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        seen.lock().unwrap().push((peer, auth));

        Json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "ok" } }]
        }))
    }

    #[tokio::test]
    async fn test_turns_share_one_connection_pool_with_their_own_keys() {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        let settings = Settings {
            openai_base_url: format!("http://{}", addr),
            ..Settings::default()
        };
        let factory = OpenAiAgentFactory::new(
            Arc::new(settings),
            Arc::new(InMemoryVectorStore::new()),
            None,
        )
        .unwrap();

        for key in ["sk-first", "sk-second"] {
            let agents = factory.build(key).unwrap();
            let completion = assert_ok!(
                agents
                    .gateway()
                    .complete(LlmRequest::text(vec![LlmMessage::user("ping")]))
                    .await
            );
            assert_eq!(completion.into_text().unwrap(), "ok");
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, "Bearer sk-first");
        assert_eq!(seen[1].1, "Bearer sk-second");
        assert_eq!(seen[0].0, seen[1].0, "second turn opened a new connection");
    }
}
