//! Core data models for the assistant

use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Conversation =================
//

/// Role of a conversation turn entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One entry of the turn history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

//
// ================= Routing =================
//

pub const INVESTMENT_STRATEGY_TOKEN: &str = "investment_strategy_agent";
pub const RESEARCH_TOKEN: &str = "research_agent";

/// Agent type label handed to the finalizer prompt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    General,
    InvestmentStrategy,
    Research,
}

impl AgentType {
    /// Derive the agent type from the raw router output
    pub fn from_router_response(router_response: Option<&str>) -> Self {
        match router_response {
            Some(INVESTMENT_STRATEGY_TOKEN) => AgentType::InvestmentStrategy,
            Some(RESEARCH_TOKEN) => AgentType::Research,
            _ => AgentType::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::General => "general",
            AgentType::InvestmentStrategy => "investment_strategy",
            AgentType::Research => "research",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ================= RAG Caller =================
//

/// Structured decision returned by the RAG caller model call.
/// Both fields are required; a payload missing either is malformed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RagDecision {
    pub need_rag: bool,
    pub rag_query: String,
}

/// Output of the RAG caller node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RagCallerResponse {
    pub need_rag: bool,
    pub rag_query: String,
    pub rag_results: String,
}

impl RagCallerResponse {
    pub fn from_decision(decision: RagDecision, rag_results: String) -> Self {
        Self {
            need_rag: decision.need_rag,
            rag_query: decision.rag_query,
            rag_results,
        }
    }
}

//
// ================= Retrieval =================
//

/// A passage returned by the vector store, lower distance = more similar
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPassage {
    pub content: String,
    pub distance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_from_router_response() {
        assert_eq!(
            AgentType::from_router_response(Some("investment_strategy_agent")),
            AgentType::InvestmentStrategy
        );
        assert_eq!(
            AgentType::from_router_response(Some("research_agent")),
            AgentType::Research
        );
        assert_eq!(
            AgentType::from_router_response(Some("Research_Agent")),
            AgentType::General
        );
        assert_eq!(AgentType::from_router_response(None), AgentType::General);
    }

    #[test]
    fn test_message_role_serializes_lowercase() {
        let msg = ConversationMessage::assistant("Hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "Hi");
    }

    #[test]
    fn test_rag_decision_requires_both_fields() {
        let missing: std::result::Result<RagDecision, _> =
            serde_json::from_str(r#"{"need_rag": true}"#);
        assert!(missing.is_err());

        let ok: RagDecision =
            serde_json::from_str(r#"{"need_rag": false, "rag_query": ""}"#).unwrap();
        assert!(!ok.need_rag);
    }
}
