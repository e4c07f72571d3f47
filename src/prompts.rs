//! Prompt templates
//!
//! Each template is a function so substitutions are checked at compile time.

use crate::models::AgentType;
use serde_json::{json, Value};

/// Router: answer with exactly one agent token
pub fn router_prompt(chat_context: &str) -> String {
    format!(
        r#"You are a query router that decides which specialized agent should handle a user request.

Available agents:
    - investment_strategy_agent: asset allocation, portfolio rebalancing and trading strategies
    - research_agent: market research, news analysis, fund and position tracking

Analyze the user's query and pick the most appropriate agent.

IMPORTANT: respond with EXACTLY ONE of these agent names: investment_strategy_agent or research_agent
Do not add any other text, explanation or formatting.
Example response: research_agent

Previous conversation context for a better decision:
{chat_context}
"#
    )
}

/// RAG caller: decide whether the knowledge base should be searched
pub fn rag_caller_prompt(question: &str, chat_context: &str) -> String {
    format!(
        r#"You are a vector search router that decides whether retrieval is needed.

User query: {question}

Previous conversation context for a better decision:
{chat_context}

The vector store holds the book THE MARKET WIZARDS by Jack D. Schwager. If the user query is about trading,
formulate the best possible query for vector search.
If the query is not about trading, you cannot decide, or it is about investment strategies, do not use retrieval.

Respond with a JSON object of the following form:

  "need_rag": true or false,
  "rag_query": "the vector search query when retrieval is needed, otherwise an empty string"
"#
    )
}

/// JSON schema constraining the RAG caller's structured response
pub fn rag_caller_schema() -> Value {
    json!({
        "title": "RAGCallerResponse",
        "description": "Response from the RAG caller agent determining if RAG is needed",
        "type": "object",
        "properties": {
            "need_rag": {
                "type": "boolean",
                "description": "True/False"
            },
            "rag_query": {
                "type": "string",
                "description": "Your query here."
            }
        },
        "required": ["need_rag", "rag_query"],
        "additionalProperties": false
    })
}

/// Investment strategy agent; `rag_results` is the retrieved text (may be empty)
pub fn investment_strategy_prompt(question: &str, rag_results: &str, chat_context: &str) -> String {
    format!(
        r#"You are an investment strategy expert offering personalized, data-driven advice on asset allocation,
portfolio rebalancing and trading strategies. Analyze the user's query: {question} and the previous chat context: {chat_context}

1. **Trading-Related Inquiries:**
   - Check the retrieved knowledge: {rag_results}. If it holds relevant information, integrate it into your answer. Otherwise tell the user 'No information found'.

2. **General Investment Strategy, Portfolio Optimization or Asset Allocation:**
   - Combine your expert knowledge with any retrieved insights to give comprehensive, actionable advice aligned with the user's financial goals.

Give clear and effective advice, making practical use of both your expertise and any retrieved data.
"#
    )
}

/// Research agent; instructs the model to call the market research tool first
pub fn research_prompt(query: &str, chat_context: &str, tool_name: &str) -> String {
    format!(
        r#"You are a market research expert specializing in financial analysis. Provide insights based on the latest available information.

USER QUERY: {query}

INSTRUCTIONS:
1. For the user query above, first use the {tool_name} tool to gather current information
2. Pass the user's exact question to the tool to get the most relevant results
3. Analyze the information returned by the tool
4. Write a comprehensive response that directly answers the user's question

Your response should:
- Be based primarily on the information retrieved from the {tool_name} tool
- Provide factual, data-driven insights
- Be well-structured and easy to understand
- Address all aspects of the user's question

Always use the {tool_name} tool before answering so the information is up to date.
Previous conversation context for a better decision:
{chat_context}
"#
    )
}

/// Query expansion for multi-query retrieval
pub fn query_expansion_prompt(question: &str) -> String {
    format!(
        r#"You are a retrieval assistant who knows how to query a vector database.

Generate five different versions of the given user question to retrieve relevant documents from a vector
database. Looking at the question from several perspectives helps overcome the limitations of
distance-based similarity search.
Provide the alternative questions separated by newlines. Original question: {question}"#
    )
}

/// Finalizer: cosmetic reformatting that keeps every fact
pub fn final_formatter_prompt(user_query: &str, agent_response: &str, agent_type: AgentType) -> String {
    format!(
        r#"You are a financial advisor assistant responsible for formatting responses for consistency and clarity.

USER QUERY: {user_query}

AGENT RESPONSE: {agent_response}

AGENT TYPE: {agent_type}

Format the agent response above into a clear, professional, well-structured answer.

IMPORTANT: the agent response may have formatting issues such as:
- Run-together words without spaces (like 'StockExchange' instead of 'Stock Exchange')
- Missing spaces after punctuation
- Vertical text where characters are separated by newlines
- Improper formatting of numbers and currency

Fix these issues while keeping all factual information.

Guidelines:
1. Keep all the factual information and insights from the original response
2. Fix formatting issues, especially run-together words and improper spacing
3. Organize the content with headings and bullet points where relevant
4. Keep a consistent tone and style throughout

The final response should be professional, easy to read, and keep all the valuable information from the original agent response.
"#
    )
}
