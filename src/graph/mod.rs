//! Orchestration graph
//!
//! initialize_memory -> add_human_message -> router -> {rag_caller | research}
//! rag_caller -> investment_strategy -> end
//! research -> end
//! end -> add_ai_message
//!
//! Nodes run strictly in sequence. The router edge is the only conditional
//! one; every other successor is fixed.

use crate::agents::{AgentSet, FinalAnswer};
use crate::error::AssistantError;
use crate::models::{ConversationMessage, RagCallerResponse, INVESTMENT_STRATEGY_TOKEN, RESEARCH_TOKEN};
use crate::state::{ConversationState, TracePhase, Tracer, END_CHAIN};
use crate::Result;
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    InitializeMemory,
    AddHumanMessage,
    Router,
    RagCaller,
    InvestmentStrategy,
    Research,
    End,
    AddAiMessage,
}

impl NodeId {
    pub const ENTRY: NodeId = NodeId::InitializeMemory;
    pub const FINISH: NodeId = NodeId::AddAiMessage;

    pub fn name(&self) -> &'static str {
        match self {
            NodeId::InitializeMemory => "initialize_memory",
            NodeId::AddHumanMessage => "add_human_message",
            NodeId::Router => "router",
            NodeId::RagCaller => "rag_caller",
            NodeId::InvestmentStrategy => "investment_strategy",
            NodeId::Research => "research",
            NodeId::End => "end",
            NodeId::AddAiMessage => "add_ai_message",
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Branch taken after the router.
///
/// Only the two exact agent tokens select a branch. Every other value,
/// including empty or malformed model output, goes to research.
pub fn route_after_router(router_response: Option<&str>) -> NodeId {
    match router_response {
        Some(INVESTMENT_STRATEGY_TOKEN) => NodeId::RagCaller,
        Some(RESEARCH_TOKEN) => NodeId::Research,
        _ => NodeId::Research,
    }
}

/// Successor of `node`; `None` once the finish node has run
pub fn successor(node: NodeId, state: &ConversationState) -> Option<NodeId> {
    match node {
        NodeId::InitializeMemory => Some(NodeId::AddHumanMessage),
        NodeId::AddHumanMessage => Some(NodeId::Router),
        NodeId::Router => Some(route_after_router(state.router_response.as_deref())),
        NodeId::RagCaller => Some(NodeId::InvestmentStrategy),
        NodeId::InvestmentStrategy | NodeId::Research => Some(NodeId::End),
        NodeId::End => Some(NodeId::AddAiMessage),
        NodeId::AddAiMessage => None,
    }
}

/// A turn that stopped at a failing node
#[derive(Debug, Error)]
#[error("turn failed at node '{node}': {error}")]
pub struct TurnFailure {
    pub node: NodeId,
    /// State as it stood when the failing node started
    pub state: Box<ConversationState>,
    #[source]
    pub error: AssistantError,
}

impl From<TurnFailure> for AssistantError {
    fn from(failure: TurnFailure) -> Self {
        AssistantError::TurnAborted {
            node: failure.node.name().to_string(),
            source: Box::new(failure.error),
        }
    }
}

/// What a node produced; applied to the state only when the node succeeds
enum NodeOutput {
    MemoryInitialized,
    HumanMessage,
    Routed(String),
    RagCalled(RagCallerResponse),
    Answered(String),
    Finalized(FinalAnswer),
    AiMessage,
}

pub struct TurnGraph {
    agents: AgentSet,
    tracer: Tracer,
}

impl TurnGraph {
    pub fn new(agents: AgentSet, tracer: Tracer) -> Self {
        Self { agents, tracer }
    }

    /// Walk the graph from entry to finish for one turn
    pub async fn run(
        &self,
        mut state: ConversationState,
    ) -> std::result::Result<ConversationState, TurnFailure> {
        let started = Instant::now();
        let mut node = NodeId::ENTRY;

        loop {
            self.tracer.track(&mut state, node.name(), TracePhase::Before);
            debug!(node = %node, "Entering node");

            let output = match self.execute(node, &state).await {
                Ok(output) => output,
                Err(error) => {
                    warn!(node = %node, error = %error, "Node failed, aborting turn");
                    return Err(TurnFailure {
                        node,
                        state: Box::new(state),
                        error,
                    });
                }
            };

            apply(&mut state, output);
            self.tracer.track(&mut state, node.name(), TracePhase::After);

            match successor(node, &state) {
                Some(next) => {
                    if node == NodeId::Router {
                        info!(
                            router_response = state.router_response.as_deref().unwrap_or(""),
                            route = %next,
                            "Routed turn"
                        );
                    }
                    node = next;
                }
                None => break,
            }
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            messages = state.messages().len(),
            "Turn complete"
        );

        Ok(state)
    }

    async fn execute(&self, node: NodeId, state: &ConversationState) -> Result<NodeOutput> {
        let output = match node {
            NodeId::InitializeMemory => NodeOutput::MemoryInitialized,
            NodeId::AddHumanMessage => NodeOutput::HumanMessage,
            NodeId::Router => NodeOutput::Routed(self.agents.route(state).await?),
            NodeId::RagCaller => NodeOutput::RagCalled(self.agents.call_rag(state).await?),
            NodeId::InvestmentStrategy => {
                NodeOutput::Answered(self.agents.advise_investment(state).await?)
            }
            NodeId::Research => NodeOutput::Answered(self.agents.research(state).await?),
            NodeId::End => NodeOutput::Finalized(self.agents.finalize(state).await?),
            NodeId::AddAiMessage => NodeOutput::AiMessage,
        };

        Ok(output)
    }
}

fn apply(state: &mut ConversationState, output: NodeOutput) {
    match output {
        NodeOutput::MemoryInitialized => {
            state.messages.get_or_insert_with(Vec::new);
        }
        NodeOutput::HumanMessage => {
            if !state.human_input.is_empty() {
                let message = ConversationMessage::user(state.human_input.clone());
                state.messages.get_or_insert_with(Vec::new).push(message);
            }
        }
        NodeOutput::Routed(router_response) => {
            state.router_response = Some(router_response);
        }
        NodeOutput::RagCalled(response) => {
            state.rag_caller_response = Some(response);
            state.next_node = Some(NodeId::InvestmentStrategy.name().to_string());
        }
        NodeOutput::Answered(answer) => {
            state.agent_response = Some(answer);
        }
        NodeOutput::Finalized(answer) => {
            state.formatted_response = Some(answer.formatted.clone());
            state.agent_response = Some(answer.formatted);
            state.original_response = Some(answer.original);
            state.end_chain = Some(END_CHAIN.to_string());
        }
        NodeOutput::AiMessage => {
            if let Some(answer) = state.agent_response.as_ref().filter(|a| !a.is_empty()) {
                let message = ConversationMessage::assistant(answer.clone());
                state.messages.get_or_insert_with(Vec::new).push(message);
            }
        }
    }
}
