//! Hosted language model client.
//!
//! [`ChatModel`] is the seam the agent talks through. [`OpenAiChatModel`]
//! implements it against an OpenAI-compatible `POST {base_url}/chat/completions`
//! endpoint, sharing the retry/backoff policy in [`crate::http`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ModelConfig, API_KEY_ENV};
use crate::error::{DiveLogError, DiveResult};
use crate::http;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in the chat-completions wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

/// Name plus the raw JSON-encoded arguments string the model produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// A language model that can answer or request tool calls.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete the conversation. The returned message has role `assistant`
    /// and either text content, tool calls, or both.
    async fn complete(&self, messages: &[ChatMessage], tools: &[Value]) -> DiveResult<ChatMessage>;
}

pub struct OpenAiChatModel {
    model: String,
    temperature: f64,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(config: &ModelConfig, api_key: String) -> DiveResult<Self> {
        if api_key.trim().is_empty() {
            return Err(DiveLogError::upstream(format!(
                "{} environment variable not set",
                API_KEY_ENV
            )));
        }
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            max_retries: config.max_retries,
            client: http::build_client(config.timeout_secs)?,
        })
    }

    fn request_body(&self, messages: &[ChatMessage], tools: &[Value]) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
            body["tool_choice"] = Value::String("auto".to_string());
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, messages: &[ChatMessage], tools: &[Value]) -> DiveResult<ChatMessage> {
        let body = self.request_body(messages, tools);
        let json =
            http::post_json_with_retry(&self.client, &self.url, &self.api_key, &body, self.max_retries)
                .await?;
        parse_completion(&json)
    }
}

/// Extract the first choice's message from a chat-completions response.
pub fn parse_completion(json: &Value) -> DiveResult<ChatMessage> {
    let message = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| DiveLogError::upstream("invalid completion response: missing choices"))?;

    let mut parsed: ChatMessage = serde_json::from_value(message.clone())
        .map_err(|e| DiveLogError::upstream(format!("invalid completion message: {}", e)))?;

    if parsed.role != Role::Assistant {
        return Err(DiveLogError::upstream(format!(
            "unexpected completion role: {:?}",
            parsed.role
        )));
    }
    if parsed.content.as_deref().map_or(false, |c| c.trim().is_empty()) {
        parsed.content = None;
    }
    Ok(parsed)
}
