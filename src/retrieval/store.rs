//! Vector stores answering nearest-neighbor queries
//!
//! Documents are ingested out of band; these stores only read.

use crate::error::AssistantError;
use crate::models::ScoredPassage;
use crate::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The `k` passages closest to `embedding`, ascending by distance
    async fn nearest_neighbors(&self, embedding: &[f64], k: usize) -> Result<Vec<ScoredPassage>>;
}

/// pgvector-backed store (`content TEXT`, `embedding vector(N)`)
pub struct PgVectorStore {
    pool: PgPool,
    table: String,
}

impl PgVectorStore {
    /// Create a store over a lazily connected pool; no connection is made until the first query
    pub fn connect_lazy(connection_string: &str, table: &str) -> Result<Self> {
        validate_table_name(table)?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(connection_string)
            .map_err(|e| {
                AssistantError::VectorStore(format!("invalid connection string: {}", e))
            })?;

        info!(table = %table, "Vector store backend: postgres");

        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    fn query_sql(&self) -> String {
        format!(
            "SELECT content, (embedding <-> $1::vector)::float8 AS distance \
             FROM {} ORDER BY distance LIMIT $2",
            self.table
        )
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn nearest_neighbors(&self, embedding: &[f64], k: usize) -> Result<Vec<ScoredPassage>> {
        let sql = self.query_sql();

        let rows: Vec<(String, f64)> = sqlx::query_as(&sql)
            .bind(vector_literal(embedding))
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AssistantError::VectorStore(format!("similarity search failed: {}", e)))?;

        debug!(rows = rows.len(), "Similarity search complete");

        Ok(rows
            .into_iter()
            .map(|(content, distance)| ScoredPassage { content, distance })
            .collect())
    }
}

/// Render an embedding in pgvector's text input format
pub fn vector_literal(embedding: &[f64]) -> String {
    let parts: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

    if valid {
        Ok(())
    } else {
        Err(AssistantError::Config(format!(
            "invalid vector table name: {}",
            table
        )))
    }
}

/// A stored passage with its embedding
#[derive(Debug, Clone)]
pub struct StoredPassage {
    pub content: String,
    pub embedding: Vec<f64>,
}

/// Brute-force Euclidean store held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorStore {
    passages: Vec<StoredPassage>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_passage(mut self, content: impl Into<String>, embedding: Vec<f64>) -> Self {
        self.passages.push(StoredPassage {
            content: content.into(),
            embedding,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn nearest_neighbors(&self, embedding: &[f64], k: usize) -> Result<Vec<ScoredPassage>> {
        let mut scored = Vec::with_capacity(self.passages.len());

        for passage in &self.passages {
            if passage.embedding.len() != embedding.len() {
                return Err(AssistantError::VectorStore(format!(
                    "dimension mismatch: query has {}, stored passage has {}",
                    embedding.len(),
                    passage.embedding.len()
                )));
            }

            let distance = passage
                .embedding
                .iter()
                .zip(embedding)
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();

            scored.push(ScoredPassage {
                content: passage.content.clone(),
                distance,
            });
        }

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);

        Ok(scored)
    }
}
