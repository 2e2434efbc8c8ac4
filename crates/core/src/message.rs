//! Message and Conversation domain types.
//!
//! A [`Conversation`] is the state one agent loop run threads through the
//! model: system prompt, user input, assistant turns (possibly requesting
//! tools) and tool results.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    /// Tool execution result
    Tool,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Attach tool calls to an assistant message.
    pub fn with_tool_calls(mut self, tool_calls: Vec<MessageToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a raw JSON string, exactly as the model produced them
    pub arguments: String,
}

/// An ordered sequence of turns owned by a single loop run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a conversation with a system prompt and the first user turn.
    pub fn seeded(system_prompt: &str, input: &str) -> Self {
        let mut conv = Self::new();
        if !system_prompt.is_empty() {
            conv.push(Message::system(system_prompt));
        }
        conv.push(Message::user(input));
        conv
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append a tool result turn.
    ///
    /// The call id must belong to an earlier assistant tool call.
    pub fn push_tool_result(
        &mut self,
        tool_call_id: &str,
        content: impl Into<String>,
    ) -> Result<(), Error> {
        let requested = self
            .messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .any(|m| m.tool_calls.iter().any(|tc| tc.id == tool_call_id));
        if !requested {
            return Err(Error::Internal(format!(
                "tool result for unknown call id '{tool_call_id}'"
            )));
        }
        self.push(Message::tool_result(tool_call_id, content));
        Ok(())
    }

    /// Content of the most recent non-empty assistant turn.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
            .find(|c| !c.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, name: &str) -> MessageToolCall {
        MessageToolCall {
            id: id.into(),
            name: name.into(),
            arguments: "{}".into(),
        }
    }

    #[test]
    fn seeded_conversation_has_system_then_user() {
        let conv = Conversation::seeded("You are terse.", "Hi");
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].role, Role::System);
        assert_eq!(conv.messages[1].role, Role::User);
        assert_eq!(conv.messages[1].content, "Hi");
    }

    #[test]
    fn seeded_without_system_prompt() {
        let conv = Conversation::seeded("", "Hi");
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].role, Role::User);
    }

    #[test]
    fn tool_result_requires_matching_call() {
        let mut conv = Conversation::seeded("sys", "go");
        assert!(conv.push_tool_result("call_1", "orphan").is_err());

        conv.push(Message::assistant("").with_tool_calls(vec![call("call_1", "echo")]));
        conv.push_tool_result("call_1", "done").unwrap();

        let last = conv.messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn last_assistant_text_skips_empty_turns() {
        let mut conv = Conversation::seeded("sys", "go");
        assert!(conv.last_assistant_text().is_none());
        conv.push(Message::assistant("thinking about it"));
        conv.push(Message::assistant("").with_tool_calls(vec![call("c", "t")]));
        assert_eq!(conv.last_assistant_text(), Some("thinking about it"));
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::user("Test message");
        let json = serde_json::to_string(&msg).unwrap();
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.content, "Test message");
        assert_eq!(deserialized.role, Role::User);
    }
}
