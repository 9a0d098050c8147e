use async_trait::async_trait;
use conductor_errors::OrchestratorError;
use conductor_types::{MessageRole, ProviderRequest, ProviderResponse, Usage};
use serde_json::{json, Value};
use std::time::Duration;

use crate::adapter::{AdapterCapabilities, ProviderAdapter};

/// Static configuration for one HTTP chat-completions endpoint. Vendor
/// differences (system-message coalescing, field names) are handled in
/// `to_wire_request`/`from_wire_response`, not by branching on `self.id`
/// elsewhere in the workspace.
pub struct HttpAdapterConfig {
    pub id: String,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub request_timeout: Duration,
    /// Vendors that reject a leading `system` message and instead expect it
    /// folded into the first user turn (spec.md §4.4 "system coalescing").
    pub coalesce_system_into_first_user: bool,
}

pub struct HttpAdapter {
    config: HttpAdapterConfig,
    client: reqwest::Client,
}

impl HttpAdapter {
    pub fn new(config: HttpAdapterConfig) -> Result<Self, OrchestratorError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| OrchestratorError::config(format!("failed to build http client: {source}")))?;
        Ok(Self { config, client })
    }

    fn to_wire_request(&self, request: &ProviderRequest) -> Value {
        let messages = coalesce_messages(&request.messages, self.config.coalesce_system_into_first_user);
        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
        });
        let obj = body.as_object_mut().expect("object literal");
        if let Some(temperature) = request.temperature {
            obj.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            obj.insert("max_tokens".into(), json!(max_tokens));
        }
        if request.json_mode {
            obj.insert("response_format".into(), json!({ "type": "json_object" }));
        }
        if let Some(tools) = &request.tools {
            obj.insert(
                "tools".into(),
                json!(tools
                    .iter()
                    .map(|t| json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    }))
                    .collect::<Vec<_>>()),
            );
        }
        body
    }

    fn from_wire_response(&self, raw: Value) -> Result<ProviderResponse, OrchestratorError> {
        let choice = raw
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .ok_or_else(|| OrchestratorError::provider(format!("{}: response had no choices", self.config.id)))?;

        let message = choice.get("message").cloned().unwrap_or(Value::Null);
        let text = message.get("content").and_then(Value::as_str).map(str::to_string);

        let tool_calls = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|call| {
                        let id = call.get("id")?.as_str()?.to_string();
                        let function = call.get("function")?;
                        let name = function.get("name")?.as_str()?.to_string();
                        let arguments_raw = function.get("arguments")?.as_str().unwrap_or("{}");
                        let arguments = serde_json::from_str(arguments_raw).unwrap_or(Value::Null);
                        Some(conductor_types::ToolCall { id, name, arguments })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let usage = raw.get("usage").and_then(Value::as_object).map(|obj| Usage {
            input_tokens: obj.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
            output_tokens: obj.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
            total_tokens: obj.get("total_tokens").and_then(Value::as_u64),
        });

        Ok(ProviderResponse {
            text,
            tool_calls,
            usage,
            raw,
        })
    }

    /// Maps an HTTP status to the taxonomy, spec.md §4.4/§7/§8: 429 is
    /// retriable rate limiting, 401/403 are terminal config errors, other
    /// 4xx statuses are terminal provider errors (the request itself is bad;
    /// retrying it verbatim cannot succeed), and 5xx (or anything else
    /// unexpected) is a retriable provider error.
    fn status_to_error(&self, status: reqwest::StatusCode, body: &str) -> OrchestratorError {
        match status.as_u16() {
            429 => OrchestratorError::RateLimit { retry_after: None },
            401 | 403 => OrchestratorError::config(format!("{}: authentication rejected ({status})", self.config.id)),
            400..=499 => {
                OrchestratorError::provider_terminal(format!("{}: http {status}: {body}", self.config.id))
            }
            _ => OrchestratorError::provider(format!("{}: http {status}: {body}", self.config.id)),
        }
    }
}

fn coalesce_messages(messages: &[conductor_types::ProviderMessage], coalesce: bool) -> Vec<Value> {
    if !coalesce {
        return messages
            .iter()
            .map(|m| json!({ "role": role_str(m.role), "content": m.content }))
            .collect();
    }

    let mut out = Vec::with_capacity(messages.len());
    let mut pending_system: Vec<&str> = Vec::new();
    for message in messages {
        match message.role {
            MessageRole::System => pending_system.push(&message.content),
            MessageRole::User if !pending_system.is_empty() => {
                let merged = format!("{}\n\n{}", pending_system.join("\n\n"), message.content);
                pending_system.clear();
                out.push(json!({ "role": "user", "content": merged }));
            }
            _ => out.push(json!({ "role": role_str(message.role), "content": message.content })),
        }
    }
    // Trailing system messages with no following user turn still need to go
    // out; fold them into a synthetic user turn rather than dropping them.
    if !pending_system.is_empty() {
        out.push(json!({ "role": "user", "content": pending_system.join("\n\n") }));
    }
    out
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

#[async_trait]
impl ProviderAdapter for HttpAdapter {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            supports_json_mode: true,
            supports_tool_calls: true,
            supports_streaming: false,
        }
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, OrchestratorError> {
        let body = self.to_wire_request(request);
        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| {
                if source.is_timeout() {
                    OrchestratorError::timeout(self.config.request_timeout)
                } else {
                    OrchestratorError::Network(source.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.status_to_error(status, &text));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|source| OrchestratorError::provider(format!("{}: malformed response body: {source}", self.config.id)))?;
        self.from_wire_response(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_types::ProviderMessage;

    fn adapter(coalesce: bool) -> HttpAdapter {
        HttpAdapter::new(HttpAdapterConfig {
            id: "test-http".into(),
            base_url: "https://example.invalid/v1/chat/completions".into(),
            model: "test-model".into(),
            api_key: "sk-test".into(),
            request_timeout: Duration::from_secs(30),
            coalesce_system_into_first_user: coalesce,
        })
        .expect("client should build")
    }

    #[test]
    fn system_message_stays_separate_when_not_coalesced() {
        let request = ProviderRequest::new(vec![
            ProviderMessage::system("be terse"),
            ProviderMessage::user("hello"),
        ]);
        let wire = adapter(false).to_wire_request(&request);
        let messages = wire["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
    }

    #[test]
    fn system_message_folds_into_first_user_turn_when_coalesced() {
        let request = ProviderRequest::new(vec![
            ProviderMessage::system("be terse"),
            ProviderMessage::user("hello"),
        ]);
        let wire = adapter(true).to_wire_request(&request);
        let messages = wire["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert!(messages[0]["content"].as_str().unwrap().contains("be terse"));
        assert!(messages[0]["content"].as_str().unwrap().contains("hello"));
    }

    #[test]
    fn trailing_system_message_with_no_user_turn_still_emitted() {
        let request = ProviderRequest::new(vec![ProviderMessage::system("be terse")]);
        let wire = adapter(true).to_wire_request(&request);
        let messages = wire["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn parses_choice_text_and_usage() {
        let raw = json!({
            "choices": [{ "message": { "role": "assistant", "content": "hi there" } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14 },
        });
        let response = adapter(false).from_wire_response(raw).unwrap();
        assert_eq!(response.text.as_deref(), Some("hi there"));
        assert_eq!(response.usage.unwrap().total_tokens, Some(14));
    }

    #[test]
    fn parses_tool_calls_with_json_arguments() {
        let raw = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "call_1",
                        "function": { "name": "apply_patch", "arguments": "{\"path\":\"a.rs\"}" }
                    }]
                }
            }]
        });
        let response = adapter(false).from_wire_response(raw).unwrap();
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "apply_patch");
        assert_eq!(response.tool_calls[0].arguments["path"], "a.rs");
    }

    #[test]
    fn missing_choices_is_a_provider_error() {
        let raw = json!({ "choices": [] });
        let error = adapter(false).from_wire_response(raw).unwrap_err();
        assert!(matches!(error, OrchestratorError::Provider { .. }));
    }

    #[test]
    fn rate_limit_status_maps_to_rate_limit_variant() {
        let error = adapter(false).status_to_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(error, OrchestratorError::RateLimit { .. }));
    }

    #[test]
    fn auth_status_maps_to_config_variant() {
        let error = adapter(false).status_to_error(reqwest::StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(error, OrchestratorError::Config { .. }));
    }

    #[test]
    fn non_429_4xx_status_is_terminal_not_retried() {
        for status in [
            reqwest::StatusCode::BAD_REQUEST,
            reqwest::StatusCode::NOT_FOUND,
            reqwest::StatusCode::CONFLICT,
            reqwest::StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            let error = adapter(false).status_to_error(status, "bad request");
            assert_eq!(
                conductor_errors::classify(&error),
                conductor_errors::Classification::Terminal,
                "status {status} should not be retried"
            );
        }
    }

    #[test]
    fn server_error_status_is_retriable() {
        let error = adapter(false).status_to_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "oops");
        assert_eq!(
            conductor_errors::classify(&error),
            conductor_errors::Classification::Retriable
        );
    }
}
