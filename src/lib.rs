//! Stock Market Assistant
//!
//! A conversational assistant for stock-market questions. Each turn runs a
//! fixed agent graph:
//!
//! INIT MEMORY → HUMAN MESSAGE → ROUTER → (RAG CALLER → INVESTMENT STRATEGY | RESEARCH)
//! → FINAL ANSWER → UPDATE MEMORY
//!
//! Investment questions are grounded on passages retrieved from a vector
//! store via multi-query expansion. Research questions go through a
//! tool-calling loop over a web search tool.

pub mod agents;
pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod models;
pub mod prompts;
pub mod retrieval;
pub mod state;
pub mod tools;

#[cfg(test)]
mod testing;

pub use error::{AssistantError, Result};

// Re-export common types
pub use models::*;
pub use agents::{AgentFactory, AgentSet, OpenAiAgentFactory};
pub use graph::{NodeId, TurnFailure, TurnGraph};
pub use state::{ConversationState, Tracer};
