use super::AgentSet;
use crate::error::AssistantError;
use crate::llm::{LlmMessage, LlmRequest, OutputSchema};
use crate::memory::format_chat_context;
use crate::models::{RagCallerResponse, RagDecision};
use crate::prompts;
use crate::state::ConversationState;
use crate::Result;
use tracing::{debug, info};

const RAG_CALLER_SCHEMA_NAME: &str = "RAGCallerResponse";

impl AgentSet {
    /// Decide whether retrieval is needed and run it when it is
    pub async fn call_rag(&self, state: &ConversationState) -> Result<RagCallerResponse> {
        let decision = self.rag_decision(state).await?;

        let rag_results = if decision.need_rag {
            info!(rag_query = %decision.rag_query, "Retrieval requested");
            self.retrieval.retrieve(&decision.rag_query).await?
        } else {
            debug!("Retrieval not needed");
            String::new()
        };

        Ok(RagCallerResponse::from_decision(decision, rag_results))
    }

    async fn rag_decision(&self, state: &ConversationState) -> Result<RagDecision> {
        let chat_context = format_chat_context(state.messages());
        let messages = vec![LlmMessage::system(prompts::rag_caller_prompt(
            &state.human_input,
            &chat_context,
        ))];

        if self.gateway.supports_structured_output() {
            let request = LlmRequest::structured(
                messages,
                OutputSchema {
                    name: RAG_CALLER_SCHEMA_NAME.to_string(),
                    schema: prompts::rag_caller_schema(),
                },
            );
            let value = self.gateway.complete(request).await?.into_structured()?;

            serde_json::from_value(value).map_err(|e| {
                AssistantError::MalformedOutput(format!("invalid RAG caller response: {}", e))
            })
        } else {
            let text = self
                .gateway
                .complete(LlmRequest::text(messages))
                .await?
                .into_text()?;

            parse_rag_decision(&text)
        }
    }
}

/// Parse a free-text RAG decision, tolerating a fenced JSON block
pub fn parse_rag_decision(response: &str) -> Result<RagDecision> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(cleaned).map_err(|e| {
        AssistantError::MalformedOutput(format!(
            "Failed to parse RAG caller response: {} | raw={}",
            e, response
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, CompletionMode};
    use crate::retrieval::InMemoryVectorStore;
    use crate::testing::{agent_set, agent_set_with_store, CountingMarketSearch, ScriptedGateway};
    use serde_json::json;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_structured_decision_runs_retrieval() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Completion::Structured(json!({ "need_rag": true, "rag_query": "cutting losses" })),
            Completion::Text("how to cut losses\nwhen to exit a loser".to_string()),
        ]));
        let store = InMemoryVectorStore::new().with_passage("Cut your losses.", vec![0.0, 0.0]);
        let agents = agent_set_with_store(
            gateway.clone(),
            Arc::new(CountingMarketSearch::new("unused")),
            store,
        );

        let response = assert_ok!(agents.call_rag(&ConversationState::new("Trading rules?")).await);

        assert!(response.need_rag);
        assert_eq!(response.rag_query, "cutting losses");
        assert_eq!(response.rag_results, "Cut your losses.");
        assert!(matches!(
            gateway.requests()[0].mode,
            CompletionMode::Structured(_)
        ));
    }

    #[tokio::test]
    async fn test_text_fallback_without_structured_support() {
        let gateway = Arc::new(
            ScriptedGateway::new(vec![Completion::Text(
                "```json\n{\"need_rag\": false, \"rag_query\": \"\"}\n```".to_string(),
            )])
            .without_structured_output(),
        );
        let agents = agent_set(gateway.clone(), Arc::new(CountingMarketSearch::new("unused")));

        let response = assert_ok!(agents.call_rag(&ConversationState::new("Allocate?")).await);

        assert!(!response.need_rag);
        assert_eq!(response.rag_results, "");
        assert_eq!(gateway.requests().len(), 1);
        assert_eq!(gateway.requests()[0].mode, CompletionMode::Text);
    }

    #[tokio::test]
    async fn test_structured_object_missing_field_is_malformed() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Completion::Structured(
            json!({ "need_rag": true }),
        )]));
        let agents = agent_set(gateway, Arc::new(CountingMarketSearch::new("unused")));

        let err = assert_err!(agents.call_rag(&ConversationState::new("q")).await);
        assert!(matches!(err, AssistantError::MalformedOutput(_)));
    }

    #[test]
    fn test_parse_plain_and_fenced_json() {
        let plain = parse_rag_decision(r#"{"need_rag": true, "rag_query": "turtle rules"}"#).unwrap();
        assert!(plain.need_rag);
        assert_eq!(plain.rag_query, "turtle rules");

        let fenced =
            parse_rag_decision("```json\n{\"need_rag\": false, \"rag_query\": \"\"}\n```").unwrap();
        assert!(!fenced.need_rag);
    }

    #[test]
    fn test_parse_rejects_prose_and_missing_fields() {
        assert!(matches!(
            parse_rag_decision("Sure! Retrieval is needed."),
            Err(AssistantError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_rag_decision(r#"{"rag_query": "x"}"#),
            Err(AssistantError::MalformedOutput(_))
        ));
    }
}
