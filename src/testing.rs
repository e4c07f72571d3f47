//! Scripted collaborators for unit tests

use crate::agents::AgentSet;
use crate::error::AssistantError;
use crate::llm::{Completion, LlmGateway, LlmRequest, Role, ToolCall};
use crate::models::{INVESTMENT_STRATEGY_TOKEN, RESEARCH_TOKEN};
use crate::models::ScoredPassage;
use crate::retrieval::{Embedder, InMemoryVectorStore, RetrievalEngine, VectorStore};
use crate::tools::{create_research_registry, MarketSearch, MARKET_RESEARCH_TOOL};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Responder = Box<dyn Fn(&LlmRequest) -> Result<Completion> + Send + Sync>;

/// Gateway replaying queued completions, then falling back to a responder
pub struct ScriptedGateway {
    queue: Mutex<VecDeque<Result<Completion>>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<LlmRequest>>,
    structured: bool,
}

impl ScriptedGateway {
    pub fn new(completions: Vec<Completion>) -> Self {
        Self::from_results(completions.into_iter().map(Ok).collect())
    }

    pub fn from_results(results: Vec<Result<Completion>>) -> Self {
        Self {
            queue: Mutex::new(results.into()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            structured: true,
        }
    }

    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&LlmRequest) -> Result<Completion> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::from_results(Vec::new())
        }
    }

    pub fn without_structured_output(mut self) -> Self {
        self.structured = false;
        self
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    async fn complete(&self, request: LlmRequest) -> Result<Completion> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(next) = self.queue.lock().unwrap().pop_front() {
            return next;
        }

        match &self.responder {
            Some(responder) => responder(&request),
            None => Err(AssistantError::Llm("scripted gateway exhausted".to_string())),
        }
    }

    fn supports_structured_output(&self) -> bool {
        self.structured
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Embedder looking texts up in a table; unknown texts map to the origin
pub struct TableEmbedder {
    dimension: usize,
    table: HashMap<String, Vec<f64>>,
}

impl TableEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            table: HashMap::new(),
        }
    }

    pub fn with(mut self, text: &str, embedding: Vec<f64>) -> Self {
        self.table.insert(text.to_string(), embedding);
        self
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        Ok(self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dimension]))
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f64>> {
        Err(AssistantError::Embedding("embedding service unavailable".to_string()))
    }
}

/// Store whose connection is always down
pub struct FailingVectorStore;

#[async_trait]
impl VectorStore for FailingVectorStore {
    async fn nearest_neighbors(&self, _embedding: &[f64], _k: usize) -> Result<Vec<ScoredPassage>> {
        Err(AssistantError::VectorStore(
            "connection refused: postgres://localhost/vectors".to_string(),
        ))
    }
}

/// Market search returning a fixed answer and recording every query
pub struct CountingMarketSearch {
    answer: String,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl CountingMarketSearch {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketSearch for CountingMarketSearch {
    async fn search(&self, query: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.answer.clone())
    }
}

/// Agent set over scripted collaborators and an empty in-memory store
pub fn agent_set(gateway: Arc<ScriptedGateway>, search: Arc<CountingMarketSearch>) -> AgentSet {
    agent_set_with_store(gateway, search, InMemoryVectorStore::new())
}

pub fn agent_set_with_store(
    gateway: Arc<ScriptedGateway>,
    search: Arc<CountingMarketSearch>,
    store: impl VectorStore + 'static,
) -> AgentSet {
    let retrieval = RetrievalEngine::new(
        gateway.clone(),
        Arc::new(TableEmbedder::new(2)),
        Arc::new(store),
        2,
    );
    AgentSet::new(gateway, retrieval, create_research_registry(Some(search)))
}

fn system_prompt(request: &LlmRequest) -> &str {
    request
        .messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

fn user_input(request: &LlmRequest) -> &str {
    request
        .messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

/// Deterministic stand-in for every prompt the graph sends
pub fn turn_gateway() -> ScriptedGateway {
    ScriptedGateway::responding(|request| {
        let prompt = system_prompt(request);

        if prompt.contains("query router") {
            let input = user_input(request).to_lowercase();
            let token = if input.contains("allocate") {
                INVESTMENT_STRATEGY_TOKEN
            } else if input.contains("news") {
                RESEARCH_TOKEN
            } else {
                "  I would pick the research one  "
            };
            return Ok(Completion::Text(format!("  {}\n", token)));
        }

        if prompt.contains("vector search router") {
            return Ok(Completion::Structured(
                json!({ "need_rag": false, "rag_query": "" }),
            ));
        }

        if prompt.contains("investment strategy expert") {
            return Ok(Completion::Text(format!(
                "No information found. Consider a 60/40 split for: {}",
                user_input(request)
            )));
        }

        if prompt.contains("market research expert") {
            let has_tool_result = request.messages.iter().any(|m| m.role == Role::Tool);
            if has_tool_result {
                return Ok(Completion::Text(format!(
                    "Latest findings for: {}",
                    user_input(request)
                )));
            }
            let query = match user_input(request) {
                "" => "market overview",
                input => input,
            };
            return Ok(Completion::ToolCalls(vec![ToolCall {
                id: "call_1".to_string(),
                name: MARKET_RESEARCH_TOOL.to_string(),
                arguments: json!({ "query": query }),
            }]));
        }

        if prompt.contains("formatting responses") {
            let raw = prompt
                .split("AGENT RESPONSE: ")
                .nth(1)
                .and_then(|rest| rest.split("\n\nAGENT TYPE").next())
                .unwrap_or("");
            return Ok(Completion::Text(format!("## Answer\n\n{}", raw)));
        }

        Ok(Completion::Text(String::new()))
    })
}
