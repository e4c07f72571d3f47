use super::AgentSet;
use crate::error::AssistantError;
use crate::llm::{Completion, LlmMessage, LlmRequest, ToolCall};
use crate::memory::format_chat_context;
use crate::prompts;
use crate::state::ConversationState;
use crate::tools::{ToolInput, ToolOutput, MARKET_RESEARCH_TOOL};
use crate::Result;
use serde_json::json;
use tracing::{debug, info, warn};

/// Model rounds allowed before the research loop gives up
pub const MAX_TOOL_ROUNDS: usize = 15;

impl AgentSet {
    /// Tool-use loop over the market research tool.
    ///
    /// Ends when the model answers instead of calling a tool. With the tool
    /// call required, an answer that arrives before any tool result is
    /// discarded: the tool runs on the exact question and the model is asked
    /// again with the result in context.
    pub async fn research(&self, state: &ConversationState) -> Result<String> {
        let chat_context = format_chat_context(state.messages());
        let specs = self.tools.specs();

        let mut messages = vec![
            LlmMessage::system(prompts::research_prompt(
                &state.human_input,
                &chat_context,
                MARKET_RESEARCH_TOOL,
            )),
            LlmMessage::user(state.human_input.clone()),
        ];
        let mut tool_results = 0usize;

        for round in 0..MAX_TOOL_ROUNDS {
            let request = LlmRequest::text(messages.clone()).with_tools(specs.clone());

            match self.gateway.complete(request).await? {
                Completion::ToolCalls(calls) => {
                    debug!(round, calls = calls.len(), "Model requested tool calls");
                    messages.push(LlmMessage::tool_request(calls.clone()));

                    for call in calls {
                        if self.tools.get(&call.name).is_some() {
                            tool_results += 1;
                        }
                        let result = self.run_tool_call(&call).await?;
                        messages.push(LlmMessage::tool_result(call.id, result));
                    }
                }
                Completion::Text(answer) => {
                    if tool_results == 0 && self.require_tool_call {
                        warn!(round, "Model answered before calling market_research; running it");
                        let call = ToolCall {
                            id: format!("call_required_{}", round),
                            name: MARKET_RESEARCH_TOOL.to_string(),
                            arguments: json!({ "query": state.human_input }),
                        };
                        let result = self.run_tool_call(&call).await?;

                        messages.push(LlmMessage::tool_request(vec![call.clone()]));
                        messages.push(LlmMessage::tool_result(call.id, result));
                        tool_results += 1;
                        continue;
                    }

                    info!(rounds = round + 1, tool_results, "Research complete");
                    return Ok(answer);
                }
                Completion::Structured(value) => {
                    return Err(AssistantError::MalformedOutput(format!(
                        "research agent expected text or tool calls, got: {}",
                        value
                    )));
                }
            }
        }

        Err(AssistantError::MalformedOutput(format!(
            "research agent produced no answer within {} rounds",
            MAX_TOOL_ROUNDS
        )))
    }

    /// Execute one requested call. Unknown tools are reported back to the
    /// model; failures of a known tool abort the turn.
    async fn run_tool_call(&self, call: &ToolCall) -> Result<String> {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Model requested an unknown tool");
            return Ok(ToolOutput::failure(format!(
                "{} is not a valid tool, try one of [{}].",
                call.name,
                self.tools.list().join(", ")
            ))
            .render());
        };

        let output = tool
            .execute(&ToolInput {
                parameters: call.arguments.clone(),
            })
            .await?;

        Ok(output.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::testing::{agent_set, CountingMarketSearch, ScriptedGateway};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn market_call(id: &str, query: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: MARKET_RESEARCH_TOOL.to_string(),
            arguments: json!({ "query": query }),
        }
    }

    #[tokio::test]
    async fn test_answer_after_one_tool_call() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Completion::ToolCalls(vec![market_call("call_1", "TSLA news")]),
            Completion::Text("Tesla rose 3%.".to_string()),
        ]));
        let search = Arc::new(CountingMarketSearch::new("TSLA +3%"));
        let agents = agent_set(gateway.clone(), search.clone());

        let answer = assert_ok!(agents.research(&ConversationState::new("Tesla news?")).await);

        assert_eq!(answer, "Tesla rose 3%.");
        assert_eq!(search.calls(), 1);

        let requests = gateway.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert!(last.content.contains("TSLA +3%"));
    }

    #[tokio::test]
    async fn test_premature_answer_triggers_required_tool_call() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Completion::Text("From memory: buy.".to_string()),
            Completion::Text("Grounded answer.".to_string()),
        ]));
        let search = Arc::new(CountingMarketSearch::new("fresh data"));
        let agents = agent_set(gateway.clone(), search.clone());

        let answer = assert_ok!(
            agents
                .research(&ConversationState::new("What's the latest on NVDA?"))
                .await
        );

        assert_eq!(answer, "Grounded answer.");
        assert_eq!(search.queries(), vec!["What's the latest on NVDA?".to_string()]);

        let second = &gateway.requests()[1];
        assert!(second
            .messages
            .iter()
            .all(|m| m.content != "From memory: buy."));
    }

    #[tokio::test]
    async fn test_premature_answer_accepted_when_not_required() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Completion::Text(
            "Quick answer.".to_string(),
        )]));
        let search = Arc::new(CountingMarketSearch::new("unused"));
        let agents = agent_set(gateway, search.clone()).with_required_tool_call(false);

        let answer = assert_ok!(agents.research(&ConversationState::new("Hi")).await);

        assert_eq!(answer, "Quick answer.");
        assert_eq!(search.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_the_model() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Completion::ToolCalls(vec![ToolCall {
                id: "call_x".to_string(),
                name: "web_search".to_string(),
                arguments: json!({ "query": "x" }),
            }]),
            Completion::ToolCalls(vec![market_call("call_2", "x")]),
            Completion::Text("done".to_string()),
        ]));
        let search = Arc::new(CountingMarketSearch::new("data"));
        let agents = agent_set(gateway.clone(), search.clone());

        assert_ok!(agents.research(&ConversationState::new("x")).await);

        let second = &gateway.requests()[1];
        let tool_message = second.messages.last().unwrap();
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_x"));
        assert!(tool_message.content.starts_with("Error: web_search is not a valid tool"));
        assert_eq!(search.calls(), 1);
    }

    #[tokio::test]
    async fn test_endless_tool_calls_exhaust_the_loop() {
        let gateway = Arc::new(ScriptedGateway::responding(|_| {
            Ok(Completion::ToolCalls(vec![ToolCall {
                id: "call_loop".to_string(),
                name: MARKET_RESEARCH_TOOL.to_string(),
                arguments: json!({ "query": "again" }),
            }]))
        }));
        let search = Arc::new(CountingMarketSearch::new("data"));
        let agents = agent_set(gateway, search.clone());

        let err = assert_err!(agents.research(&ConversationState::new("loop")).await);

        assert!(matches!(err, AssistantError::MalformedOutput(_)));
        assert_eq!(search.calls(), MAX_TOOL_ROUNDS);
    }
}
