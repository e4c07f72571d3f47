use super::AgentSet;
use crate::llm::{LlmMessage, LlmRequest};
use crate::models::AgentType;
use crate::prompts;
use crate::state::ConversationState;
use crate::Result;

/// Output of the formatting pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalAnswer {
    pub formatted: String,
    /// The agent response as it stood before formatting
    pub original: String,
}

impl AgentSet {
    pub async fn finalize(&self, state: &ConversationState) -> Result<FinalAnswer> {
        let original = state.agent_response.clone().unwrap_or_default();
        let agent_type = AgentType::from_router_response(state.router_response.as_deref());

        let request = LlmRequest::text(vec![LlmMessage::system(prompts::final_formatter_prompt(
            &state.human_input,
            &original,
            agent_type,
        ))]);

        let formatted = self.gateway.complete(request).await?.into_text()?;

        Ok(FinalAnswer { formatted, original })
    }
}
