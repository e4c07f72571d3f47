//! Error types for the stock market assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Collaborator Failures
    // =============================

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Tool error: {0}")]
    Tool(String),

    // =============================
    // Model Output
    // =============================

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    // =============================
    // Orchestration
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Turn aborted at node '{node}': {source}")]
    TurnAborted {
        node: String,
        #[source]
        source: Box<AssistantError>,
    },

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssistantError {
    /// True for errors raised by an external collaborator (gateway, store, embedder, tool)
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            AssistantError::Llm(_)
                | AssistantError::Embedding(_)
                | AssistantError::VectorStore(_)
                | AssistantError::Tool(_)
                | AssistantError::Http(_)
                | AssistantError::Database(_)
        )
    }
}
