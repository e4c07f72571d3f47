//! Tool trait and registry
//!
//! Tools are the capabilities a model may call during a tool-use loop.
//! The market research tool wraps a web search backend.

use crate::config::Settings;
use crate::error::AssistantError;
use crate::llm::ToolSpec;
use crate::Result;
use async_trait::async_trait;
use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const MARKET_RESEARCH_TOOL: &str = "market_research";

const NO_RESULT: &str = "No good search result found";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Value::String(content.into()),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Rendering handed back to the model as the tool message
    pub fn render(&self) -> String {
        if let Some(error) = &self.error {
            return format!("Error: {}", error);
        }
        match &self.data {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// A single callable tool
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// JSON schema of the tool's arguments
    fn parameters(&self) -> Value;

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Specs of every registered tool, ordered by name
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|tool| tool.spec()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Market search backend =================
//

/// Free-text web search over market news and data
#[async_trait]
pub trait MarketSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<String>;
}

/// SerpAPI (Google engine) client
#[derive(Clone)]
pub struct SerpApiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl SerpApiClient {
    pub fn new(api_key: String, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .serp_api_key
            .clone()
            .ok_or_else(|| AssistantError::Config("SERP_API_KEY is not configured".to_string()))?;
        Self::new(api_key, &settings.serp_api_base_url)
    }
}

#[async_trait]
impl MarketSearch for SerpApiClient {
    async fn search(&self, query: &str) -> Result<String> {
        let url = format!("{}/search.json", self.base_url);

        let response = self
            .client
            .get(url)
            .query(&[
                ("engine", "google"),
                ("google_domain", "google.com"),
                ("gl", "us"),
                ("hl", "en"),
                ("q", query),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AssistantError::Tool(format!("market search request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(search_status_error(status, &body));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| AssistantError::Tool(format!("invalid market search response: {}", e)))?;

        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(AssistantError::Tool(format!("market search error: {}", error)));
        }

        Ok(extract_search_answer(&body))
    }
}

fn search_status_error(status: reqwest::StatusCode, body: &str) -> AssistantError {
    let detail = body.trim();
    if detail.is_empty() {
        AssistantError::Tool(format!("market search returned {}", status))
    } else {
        AssistantError::Tool(format!("market search returned {}: {}", status, detail))
    }
}

/// Pick the most direct answer out of a SerpAPI response:
/// answer box, then knowledge graph, then organic snippets.
pub fn extract_search_answer(body: &Value) -> String {
    if let Some(answer_box) = body.get("answer_box") {
        let direct = ["answer", "snippet"]
            .iter()
            .find_map(|key| answer_box.get(*key).and_then(Value::as_str))
            .or_else(|| {
                answer_box
                    .get("snippet_highlighted_words")
                    .and_then(|words| words.get(0))
                    .and_then(Value::as_str)
            });
        if let Some(text) = direct {
            return text.to_string();
        }
    }

    if let Some(description) = body
        .get("knowledge_graph")
        .and_then(|kg| kg.get("description"))
        .and_then(Value::as_str)
    {
        return description.to_string();
    }

    let snippets: Vec<&str> = body
        .get("organic_results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|r| r.get("snippet").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if snippets.is_empty() {
        NO_RESULT.to_string()
    } else {
        snippets.join(" ")
    }
}

//
// ================= Market research tool =================
//

pub struct MarketResearchTool {
    search: Option<Arc<dyn MarketSearch>>,
}

impl MarketResearchTool {
    pub fn new(search: Arc<dyn MarketSearch>) -> Self {
        Self {
            search: Some(search),
        }
    }

    /// Tool whose calls fail until a search backend is configured
    pub fn unconfigured() -> Self {
        Self { search: None }
    }

    /// Search and stamp the result with the local time of the lookup
    pub async fn research(&self, query: &str) -> Result<String> {
        let search = self.search.as_ref().ok_or_else(|| {
            AssistantError::Tool("SERP_API_KEY is not configured".to_string())
        })?;

        let results = search.search(query).await?;
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");

        debug!(query = %query, "Market research complete");

        Ok(format!(
            "Market Research Results (as of {}):\n\n{}",
            timestamp, results
        ))
    }
}

#[async_trait]
impl Tool for MarketResearchTool {
    fn name(&self) -> &'static str {
        MARKET_RESEARCH_TOOL
    }

    fn description(&self) -> &'static str {
        "Useful for getting real-time information about stocks, market trends, company news, and financial data. Input should be a stock ticker symbol or a specific market research question."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Stock ticker symbol or market research question"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let query = match &input.parameters {
            Value::String(raw) => Some(raw.as_str()),
            params => params.get("query").and_then(Value::as_str),
        }
        .map(str::trim)
        .filter(|q| !q.is_empty());

        let Some(query) = query else {
            warn!("market_research called without a query");
            return Err(AssistantError::Tool(
                "Expected 'query' for market_research".to_string(),
            ));
        };

        Ok(ToolOutput::text(self.research(query).await?))
    }
}

/// Registry holding the research agent's single tool
pub fn create_research_registry(search: Option<Arc<dyn MarketSearch>>) -> ToolRegistry {
    let tool = match search {
        Some(search) => MarketResearchTool::new(search),
        None => MarketResearchTool::unconfigured(),
    };

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(tool));
    registry
}
