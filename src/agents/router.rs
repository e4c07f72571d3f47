use super::AgentSet;
use crate::llm::{LlmMessage, LlmRequest};
use crate::memory::format_chat_context;
use crate::prompts;
use crate::state::ConversationState;
use crate::Result;
use tracing::debug;

impl AgentSet {
    /// Ask the model which agent should handle the turn.
    ///
    /// The raw token is only trimmed; unrecognized values are resolved by
    /// the graph's routing function.
    pub async fn route(&self, state: &ConversationState) -> Result<String> {
        let chat_context = format_chat_context(state.messages());

        let request = LlmRequest::text(vec![
            LlmMessage::system(prompts::router_prompt(&chat_context)),
            LlmMessage::user(state.human_input.clone()),
        ]);

        let response = self.gateway.complete(request).await?.into_text()?;
        let token = response.trim().to_string();

        debug!(router_response = %token, "Router decided");

        Ok(token)
    }
}
