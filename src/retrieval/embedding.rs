//! Embedding generation for vector search

use crate::config::{Settings, DEFAULT_EMBEDDING_MODEL, DEFAULT_OPENAI_BASE_URL};
use crate::error::AssistantError;
use crate::llm::pooled_client;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Turns text into a fixed-dimension vector matching the store's schema
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f64>>;
}

/// OpenAI embeddings client
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self::with_client(pooled_client()?, api_key))
    }

    pub fn with_client(client: Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings, client: Client, api_key: String) -> Self {
        let mut embedder = Self::with_client(client, api_key);
        embedder.base_url = settings.openai_base_url.trim_end_matches('/').to_string();
        embedder.model = settings.embedding_model.clone();
        embedder
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f64>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let url = format!("{}/v1/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| {
                error!("Embedding request failed: {}", e);
                AssistantError::Embedding(format!("embedding request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AssistantError::Embedding(format!(
                "embedding API error {}: {}",
                status, error_text
            )));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            AssistantError::Embedding(format!("failed to parse embedding response: {}", e))
        })?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AssistantError::Embedding("empty embedding response".to_string()))?;

        debug!(dimension = embedding.len(), "Embedded query");

        Ok(embedding)
    }
}
