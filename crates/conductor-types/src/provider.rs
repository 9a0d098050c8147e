use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn in a [`ProviderRequest`]. `tool_call_id` must be set when
/// `role == Tool` and must reference a preceding assistant tool call;
/// adapters validate this before sending, they don't enforce it here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ProviderMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Named(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// The uniform request shape every adapter accepts, spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub messages: Vec<ProviderMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub json_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Extra argv tokens forwarded to a subprocess adapter's invocation,
    /// spec.md §4.4 "caller-supplied args". HTTP adapters ignore this field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caller_args: Vec<String>,
}

impl ProviderRequest {
    pub fn new(messages: Vec<ProviderMessage>) -> Self {
        Self {
            messages,
            tools: None,
            temperature: None,
            max_tokens: None,
            json_mode: false,
            tool_choice: None,
            caller_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: Option<u64>,
}

/// The uniform response shape, spec.md §3. `raw` is the untouched vendor
/// payload so callers can recover vendor-specific detail the uniform shape
/// drops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub text: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub raw: Value,
}

impl ProviderResponse {
    pub fn text_only(text: impl Into<String>, raw: Value) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
            usage: None,
            raw,
        }
    }
}

/// One event of a streaming response. A stream is a finite, single-pass
/// sequence of these; `tool_call_index` is stable across deltas belonging to
/// the same tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    TextDelta(String),
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments_delta: String,
    },
    Usage(Usage),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_message_constructors_set_role() {
        let msg = ProviderMessage::user("hello");
        assert_eq!(msg.role, MessageRole::User);
        assert!(msg.tool_call_id.is_none());
    }

    #[test]
    fn request_defaults_json_mode_false() {
        let req = ProviderRequest::new(vec![ProviderMessage::system("be terse")]);
        assert!(!req.json_mode);
    }
}
