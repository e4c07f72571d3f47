//! Conversation state threaded through every graph node
//!
//! The state is owned by a single turn. Callers hand the previous turn's
//! final state forward (or start fresh); nothing keeps a reference once the
//! turn returns.

use crate::models::{ConversationMessage, RagCallerResponse};
use serde::{Deserialize, Serialize};

pub mod session;
pub mod trace;

pub use session::{InMemorySessionStore, SessionStore};
pub use trace::{TracePhase, Tracer};

/// Sentinel the finalizer writes once a turn has produced its answer
pub const END_CHAIN: &str = "end_chain";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    pub human_input: String,

    /// Credential for the gateway; opaque to the graph and never snapshotted
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub messages: Option<Vec<ConversationMessage>>,

    #[serde(default)]
    pub router_response: Option<String>,
    #[serde(default)]
    pub rag_caller_response: Option<RagCallerResponse>,
    #[serde(default)]
    pub agent_response: Option<String>,
    #[serde(default)]
    pub original_response: Option<String>,
    #[serde(default)]
    pub formatted_response: Option<String>,
    #[serde(default)]
    pub next_node: Option<String>,
    #[serde(default)]
    pub end_chain: Option<String>,

    // Tracing fields: append-only, never read by business logic
    #[serde(default)]
    pub current_node: Option<String>,
    #[serde(default)]
    pub execution_path: Vec<String>,
    #[serde(default)]
    pub state_history: Vec<StateHistoryEntry>,
}

/// Business fields of the state, captured for the trace and the audit log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateSnapshot {
    pub human_input: String,
    pub messages: Option<Vec<ConversationMessage>>,
    pub router_response: Option<String>,
    pub rag_caller_response: Option<RagCallerResponse>,
    pub agent_response: Option<String>,
    pub original_response: Option<String>,
    pub formatted_response: Option<String>,
    pub next_node: Option<String>,
    pub end_chain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateHistoryEntry {
    pub node: String,
    pub state: StateSnapshot,
}

impl ConversationState {
    /// Fresh state for a first turn
    pub fn new(human_input: impl Into<String>) -> Self {
        Self {
            human_input: human_input.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<ConversationMessage>) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Build the input state of the next turn.
    ///
    /// Only the message history carries over from the previous final state;
    /// per-turn outputs and trace fields start empty.
    pub fn next_turn(
        previous: Option<&ConversationState>,
        human_input: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            human_input: human_input.into(),
            api_key,
            messages: previous.and_then(|prev| prev.messages.clone()),
            ..Self::default()
        }
    }

    /// Message history, empty when memory was never initialized
    pub fn messages(&self) -> &[ConversationMessage] {
        self.messages.as_deref().unwrap_or(&[])
    }

    /// Retrieved text for the investment strategy agent, empty when RAG did not run
    pub fn rag_results(&self) -> &str {
        self.rag_caller_response
            .as_ref()
            .map(|r| r.rag_results.as_str())
            .unwrap_or("")
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            human_input: self.human_input.clone(),
            messages: self.messages.clone(),
            router_response: self.router_response.clone(),
            rag_caller_response: self.rag_caller_response.clone(),
            agent_response: self.agent_response.clone(),
            original_response: self.original_response.clone(),
            formatted_response: self.formatted_response.clone(),
            next_node: self.next_node.clone(),
            end_chain: self.end_chain.clone(),
        }
    }
}
