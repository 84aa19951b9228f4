use crate::error::{BrokerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// Message role in LLM conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Tool call requested by the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub arguments: HashMap<String, Value>,
}

impl LlmToolCall {
    /// Whether `other` is the same request, by id when both carry one, else by name.
    fn answers(&self, other: &LlmToolCall) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.name == other.name,
        }
    }
}

/// Message in LLM conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    #[serde(default = "default_role")]
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<LlmToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_paths: Option<Vec<String>>,
}

fn default_role() -> MessageRole {
    MessageRole::User
}

/// Response from LLM gateway
#[derive(Debug, Clone, Default)]
pub struct LlmGatewayResponse {
    pub content: Option<String>,
    pub object: Option<Value>,
    pub tool_calls: Vec<LlmToolCall>,
}

impl LlmMessage {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: None,
            image_paths: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: None,
            image_paths: None,
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            image_paths: None,
        }
    }

    /// Create an assistant message that requests tool calls.
    ///
    /// Empty content is stored as `None`, since the calls carry the turn.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<LlmToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.filter(|c| !c.is_empty()),
            tool_calls: Some(tool_calls),
            image_paths: None,
        }
    }

    /// Create a tool message reporting the result of `call`
    pub fn tool_result(call: &LlmToolCall, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: Some(vec![call.clone()]),
            image_paths: None,
        }
    }

    /// Add image paths to this message
    pub fn with_images(mut self, paths: Vec<String>) -> Self {
        self.image_paths = Some(paths);
        self
    }

    /// Tool calls carried by this message, empty when there are none
    pub fn calls(&self) -> &[LlmToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

/// Check the tool-message invariants of a conversation.
///
/// Every tool message must echo exactly one call, and that call must be the oldest
/// unanswered request of the most recent assistant message. No other message may
/// appear while requests are still unanswered, except at the end of the conversation.
pub fn validate_conversation(messages: &[LlmMessage]) -> Result<()> {
    let mut unanswered: VecDeque<&LlmToolCall> = VecDeque::new();

    for (position, message) in messages.iter().enumerate() {
        match message.role {
            MessageRole::Tool => {
                let calls = message.calls();
                if calls.len() != 1 {
                    return Err(BrokerError::InvalidConversation(format!(
                        "tool message at {} carries {} tool calls, expected 1",
                        position,
                        calls.len()
                    )));
                }
                match unanswered.pop_front() {
                    Some(expected) if expected.answers(&calls[0]) => {}
                    Some(expected) => {
                        return Err(BrokerError::InvalidConversation(format!(
                            "tool message at {} answers {} but {} is next",
                            position, calls[0].name, expected.name
                        )));
                    }
                    None => {
                        return Err(BrokerError::InvalidConversation(format!(
                            "tool message at {} has no pending request",
                            position
                        )));
                    }
                }
            }
            _ if !unanswered.is_empty() => {
                return Err(BrokerError::InvalidConversation(format!(
                    "message at {} interrupts {} unanswered tool call(s)",
                    position,
                    unanswered.len()
                )));
            }
            MessageRole::Assistant => {
                unanswered.extend(message.calls());
            }
            MessageRole::System | MessageRole::User => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, name: &str) -> LlmToolCall {
        LlmToolCall {
            id: Some(id.to_string()),
            name: name.to_string(),
            arguments: HashMap::new(),
        }
    }

    #[test]
    fn test_message_role_serialization() {
        assert_eq!(serde_json::to_string(&MessageRole::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&MessageRole::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&MessageRole::Tool).unwrap(), "\"tool\"");
    }

    #[test]
    fn test_user_message() {
        let msg = LlmMessage::user("Hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, Some("Hello".to_string()));
        assert!(msg.tool_calls.is_none());
        assert!(msg.image_paths.is_none());
    }

    #[test]
    fn test_message_with_images() {
        let msg = LlmMessage::user("Describe this image")
            .with_images(vec!["/path/to/image.jpg".to_string()]);
        assert_eq!(msg.image_paths, Some(vec!["/path/to/image.jpg".to_string()]));
    }

    #[test]
    fn test_assistant_tool_calls_drops_empty_content() {
        let msg = LlmMessage::assistant_tool_calls(Some(String::new()), vec![call("c1", "a")]);
        assert_eq!(msg.role, MessageRole::Assistant);
        assert!(msg.content.is_none());
        assert_eq!(msg.calls().len(), 1);

        let msg = LlmMessage::assistant_tool_calls(Some("Checking".to_string()), vec![]);
        assert_eq!(msg.content, Some("Checking".to_string()));
    }

    #[test]
    fn test_tool_result_echoes_single_call() {
        let c = call("c1", "get_weather");
        let msg = LlmMessage::tool_result(&c, "{\"temp\":20}");
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.calls(), &[c]);
        assert_eq!(msg.content.as_deref(), Some("{\"temp\":20}"));
    }

    #[test]
    fn test_llm_tool_call_without_id() {
        let tool_call = LlmToolCall {
            id: None,
            name: "test_tool".to_string(),
            arguments: HashMap::new(),
        };

        let json = serde_json::to_string(&tool_call).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(json.contains("test_tool"));
    }

    #[test]
    fn test_llm_message_default_role() {
        let json = r#"{"content":"test"}"#;
        let msg: LlmMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.role, MessageRole::User);
    }

    #[test]
    fn test_validate_well_formed_round() {
        let a = call("c1", "a");
        let b = call("c2", "b");
        let messages = vec![
            LlmMessage::user("go"),
            LlmMessage::assistant_tool_calls(None, vec![a.clone(), b.clone()]),
            LlmMessage::tool_result(&a, "1"),
            LlmMessage::tool_result(&b, "2"),
            LlmMessage::assistant("done"),
        ];

        assert!(validate_conversation(&messages).is_ok());
    }

    #[test]
    fn test_validate_matches_by_name_without_ids() {
        let mut a = call("x", "a");
        a.id = None;
        let messages = vec![
            LlmMessage::assistant_tool_calls(None, vec![a.clone()]),
            LlmMessage::tool_result(&a, "1"),
        ];

        assert!(validate_conversation(&messages).is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_order_results() {
        let a = call("c1", "a");
        let b = call("c2", "b");
        let messages = vec![
            LlmMessage::assistant_tool_calls(None, vec![a.clone(), b.clone()]),
            LlmMessage::tool_result(&b, "2"),
            LlmMessage::tool_result(&a, "1"),
        ];

        assert!(matches!(
            validate_conversation(&messages),
            Err(BrokerError::InvalidConversation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_orphan_tool_message() {
        let messages = vec![LlmMessage::user("hi"), LlmMessage::tool_result(&call("c1", "a"), "1")];

        assert!(validate_conversation(&messages).is_err());
    }

    #[test]
    fn test_validate_rejects_interrupted_round() {
        let a = call("c1", "a");
        let messages = vec![
            LlmMessage::assistant_tool_calls(None, vec![a]),
            LlmMessage::user("never mind"),
        ];

        assert!(validate_conversation(&messages).is_err());
    }

    #[test]
    fn test_validate_allows_trailing_unanswered_request() {
        let messages = vec![
            LlmMessage::user("go"),
            LlmMessage::assistant_tool_calls(None, vec![call("c1", "a")]),
        ];

        assert!(validate_conversation(&messages).is_ok());
    }
}
