//! Multi-query retrieval engine
//!
//! One question fans out into several paraphrases; each is embedded and
//! searched independently, then the pooled hits are ranked globally,
//! deduplicated by content and truncated.

use crate::error::AssistantError;
use crate::llm::{LlmGateway, LlmMessage, LlmRequest};
use crate::models::ScoredPassage;
use crate::prompts;
use crate::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

pub mod embedding;
pub mod store;

pub use embedding::{Embedder, OpenAiEmbedder};
pub use store::{InMemoryVectorStore, PgVectorStore, VectorStore};

/// Nearest neighbors fetched per expanded query
pub const NEIGHBORS_PER_QUERY: usize = 2;

/// Passages kept after ranking and deduplication
pub const TOP_PASSAGES: usize = 3;

pub const PASSAGE_SEPARATOR: &str = "\n\n";

pub struct RetrievalEngine {
    gateway: Arc<dyn LlmGateway>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    concurrency: usize,
}

impl RetrievalEngine {
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            gateway,
            embedder,
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Retrieve the best passages for `question`, joined into one block.
    /// An empty pool yields an empty string, not an error.
    pub async fn retrieve(&self, question: &str) -> Result<String> {
        let queries = self.expand_query(question).await?;
        info!(queries = queries.len(), "Expanded retrieval query");

        let pool = self.search_all(queries).await?;
        let ranked = rank_and_deduplicate(pool, TOP_PASSAGES);

        info!(passages = ranked.len(), "Retrieval complete");

        Ok(join_passages(&ranked))
    }

    /// Ask the model for paraphrases of `question`; whatever count comes back is used
    pub async fn expand_query(&self, question: &str) -> Result<Vec<String>> {
        let request = LlmRequest::text(vec![LlmMessage::user(prompts::query_expansion_prompt(
            question,
        ))]);

        let text = self.gateway.complete(request).await?.into_text()?;

        Ok(parse_expanded_queries(&text))
    }

    /// Embed and search every query on a bounded set of tasks.
    ///
    /// All tasks are joined before returning. The pool keeps query order so
    /// ties in distance rank the same way on every run.
    pub async fn search_all(&self, queries: Vec<String>) -> Result<Vec<ScoredPassage>> {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, query) in queries.into_iter().enumerate() {
            let permits = permits.clone();
            let embedder = self.embedder.clone();
            let store = self.store.clone();

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|e| {
                    AssistantError::VectorStore(format!("search worker pool closed: {}", e))
                })?;

                let embedding = embedder.embed(&query).await?;
                let hits = store
                    .nearest_neighbors(&embedding, NEIGHBORS_PER_QUERY)
                    .await?;

                debug!(index, query = %query, hits = hits.len(), "Query searched");

                Ok::<_, AssistantError>((index, hits))
            });
        }

        let mut per_query = Vec::new();

        // Dropping the set on an early return aborts the remaining searches
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| {
                AssistantError::VectorStore(format!("search task failed: {}", e))
            })?;
            per_query.push(result?);
        }

        per_query.sort_by_key(|(index, _)| *index);

        Ok(per_query.into_iter().flat_map(|(_, hits)| hits).collect())
    }
}

/// Split the expansion response on newlines, dropping blank lines
pub fn parse_expanded_queries(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Sort ascending by distance, keep the first occurrence of each content,
/// and truncate to `limit`.
pub fn rank_and_deduplicate(mut pool: Vec<ScoredPassage>, limit: usize) -> Vec<ScoredPassage> {
    pool.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(limit);

    for passage in pool {
        if kept.len() == limit {
            break;
        }
        if seen.insert(passage.content.clone()) {
            kept.push(passage);
        }
    }

    kept
}

pub fn join_passages(passages: &[ScoredPassage]) -> String {
    passages
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join(PASSAGE_SEPARATOR)
}
