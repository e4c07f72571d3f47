//! Conversation memory helpers
//!
//! Every agent sees the same bounded window of recent history, rendered as
//! labeled lines for prompt templates.

use crate::models::{ConversationMessage, MessageRole};

/// Number of most recent messages visible to agents
pub const CHAT_CONTEXT_WINDOW: usize = 10;

/// Rendered when there is no history at all
pub const NO_PREVIOUS_CONVERSATION: &str = "No previous conversation.";

/// The last `CHAT_CONTEXT_WINDOW` messages, oldest first
pub fn recent_messages(messages: &[ConversationMessage]) -> &[ConversationMessage] {
    let start = messages.len().saturating_sub(CHAT_CONTEXT_WINDOW);
    &messages[start..]
}

/// Render recent history for a prompt
pub fn format_chat_context(messages: &[ConversationMessage]) -> String {
    if messages.is_empty() {
        return NO_PREVIOUS_CONVERSATION.to_string();
    }

    let mut context = String::from("Previous conversation:\n");

    for msg in recent_messages(messages) {
        let role = match msg.role {
            MessageRole::User => "User",
            MessageRole::Assistant => "Assistant",
        };
        context.push_str(&format!("{}: {}\n\n", role, msg.content));
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(len: usize) -> Vec<ConversationMessage> {
        (0..len)
            .map(|i| {
                if i % 2 == 0 {
                    ConversationMessage::user(format!("Question {}", i))
                } else {
                    ConversationMessage::assistant(format!("Answer {}", i))
                }
            })
            .collect()
    }

    #[test]
    fn test_empty_history_renders_literal() {
        assert_eq!(format_chat_context(&[]), "No previous conversation.");
    }

    #[test]
    fn test_labels_alternate() {
        let rendered = format_chat_context(&history(2));
        assert!(rendered.starts_with("Previous conversation:\n"));
        assert!(rendered.contains("User: Question 0\n\n"));
        assert!(rendered.contains("Assistant: Answer 1\n\n"));
    }

    #[test]
    fn test_window_never_exceeds_ten_messages() {
        for len in 0..40 {
            let messages = history(len);
            let window = recent_messages(&messages);
            assert_eq!(window.len(), len.min(CHAT_CONTEXT_WINDOW));

            let rendered = format_chat_context(&messages);
            let lines = rendered
                .lines()
                .filter(|l| l.starts_with("User:") || l.starts_with("Assistant:"))
                .count();
            assert_eq!(lines, len.min(CHAT_CONTEXT_WINDOW));
        }
    }

    #[test]
    fn test_window_keeps_the_most_recent() {
        let messages = history(15);
        let rendered = format_chat_context(&messages);
        assert!(!rendered.contains("Question 4\n"));
        assert!(rendered.contains("Answer 5"));
        assert!(rendered.contains("Question 14"));
    }
}
