//! Bounded conversation history shared by the chat command.

use super::ChatMessage;

/// Conversation buffer that always keeps the system prompt at index 0.
///
/// When full, the oldest message after the system prompt is dropped. A tool
/// result is never left without the assistant turn that requested it.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
    limit: usize,
}

impl ChatHistory {
    /// `limit` counts the system prompt and is clamped to at least 2.
    pub fn new(system_prompt: impl Into<String>, limit: usize) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
            limit: limit.max(2),
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        while self.messages.len() > self.limit {
            self.messages.remove(1);
        }
        // Drop tool results orphaned by the trim above
        while self.messages.len() > 1 && self.messages[1].tool_call_id.is_some() {
            self.messages.remove(1);
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.len() <= 1
    }

    /// Forget everything except the system prompt.
    pub fn clear(&mut self) {
        self.messages.truncate(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_keeps_system_prompt_when_full() {
        let mut history = ChatHistory::new("be chill", 3);
        history.push(ChatMessage::user("one"));
        history.push(ChatMessage::assistant("two"));
        history.push(ChatMessage::user("three"));

        assert_eq!(history.len(), 3);
        assert_eq!(history.messages()[0].role, Role::System);
        assert_eq!(history.messages()[1].content.as_deref(), Some("two"));
        assert_eq!(history.messages()[2].content.as_deref(), Some("three"));
    }

    #[test]
    fn test_orphaned_tool_results_are_dropped() {
        let mut history = ChatHistory::new("sys", 3);
        history.push(ChatMessage::user("weather?"));
        history.push(ChatMessage::tool_result("call_1", "{\"temperature\":70}"));
        history.push(ChatMessage::assistant("It's 70."));

        assert!(history.messages().iter().skip(1).all(|m| m.tool_call_id.is_none()));
        assert_eq!(history.messages().last().unwrap().content.as_deref(), Some("It's 70."));
    }

    #[test]
    fn test_clear() {
        let mut history = ChatHistory::new("sys", 10);
        history.push(ChatMessage::user("hi"));
        assert!(!history.is_empty());

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.messages()[0].content.as_deref(), Some("sys"));
    }
}
