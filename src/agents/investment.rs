use super::AgentSet;
use crate::llm::{LlmMessage, LlmRequest};
use crate::memory::format_chat_context;
use crate::prompts;
use crate::state::ConversationState;
use crate::Result;

impl AgentSet {
    /// Single completion over the question and whatever retrieval produced
    pub async fn advise_investment(&self, state: &ConversationState) -> Result<String> {
        let chat_context = format_chat_context(state.messages());

        let request = LlmRequest::text(vec![
            LlmMessage::system(prompts::investment_strategy_prompt(
                &state.human_input,
                state.rag_results(),
                &chat_context,
            )),
            LlmMessage::user(state.human_input.clone()),
        ]);

        self.gateway.complete(request).await?.into_text()
    }
}
