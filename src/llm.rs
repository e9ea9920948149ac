//! Remote chat model boundary.
//!
//! Message types follow the OpenAI chat-completions wire format, which
//! Gemini also serves from its OpenAI-compatible endpoint. The assistant's
//! `content` is not guaranteed to be a plain string: some models return a
//! list of typed blocks (text mixed with images, reasoning, etc.), so it is
//! modelled as [`MessageContent`] and folded to text with
//! [`MessageContent::to_text`].
//!
//! [`ChatModel`] is the seam the agent talks to; [`OpenAiCompatibleChat`] is
//! the HTTP implementation.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::LlmConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

fn default_role() -> Role {
    Role::Assistant
}

/// Message content: a plain string or a list of typed blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Concatenate the textual parts, dropping every block without text.
    pub fn to_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks.iter().filter_map(ContentBlock::text).collect(),
        }
    }
}

/// One element of a block-list content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },
    Other(Value),
}

impl ContentBlock {
    pub fn text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text, .. } => Some(text),
            ContentBlock::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments.
    #[serde(default, deserialize_with = "string_or_json")]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl ToolCall {
    /// Decode the arguments. Empty arguments decode to `{}`.
    pub fn parsed_arguments(&self) -> Result<Value, ChatError> {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_str(raw).map_err(|e| {
            ChatError::Malformed(format!(
                "arguments for tool '{}' are not valid JSON: {}",
                self.function.name, e
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "null_as_empty"
    )]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(content.into())),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Result of executing `call`, addressed back to it by id.
    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.function.name.clone()),
            ..Self::new(Role::Tool, content)
        }
    }

    /// Textual content, empty when there is none.
    pub fn text(&self) -> String {
        self.content
            .as_ref()
            .map(MessageContent::to_text)
            .unwrap_or_default()
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// A tool declaration as sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn to_openai(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("chat request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed chat response: {0}")]
    Malformed(String),
}

/// A chat-completion model that can call tools.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send the conversation so far and return the assistant's reply. The
    /// reply either carries `tool_calls` or is the final answer.
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatMessage>;
}

/// Chat model reached over an OpenAI-compatible `/chat/completions` API.
///
/// Retry strategy (only when `llm.max_retries > 0`):
/// - HTTP 429 or 5xx → retry with exponential backoff (1s, 2s, 4s, … capped at 32s)
/// - HTTP 4xx (not 429) → fail immediately
/// - Network error → retry
pub struct OpenAiCompatibleChat {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl OpenAiCompatibleChat {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(ToolSpec::to_openai).collect());
        }
        body
    }

    async fn send_once(&self, body: &Value) -> Result<ChatMessage, (ChatError, bool)> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| (ChatError::Http(e), true))?;

        let status = response.status();
        if !status.is_success() {
            let retryable = status.as_u16() == 429 || status.is_server_error();
            let body = response.text().await.unwrap_or_default();
            return Err((
                ChatError::Api {
                    status: status.as_u16(),
                    body,
                },
                retryable,
            ));
        }

        let json: Value = response.json().await.map_err(|e| (ChatError::Http(e), false))?;
        parse_completion(&json).map_err(|e| (e, false))
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatMessage> {
        let body = self.request_body(messages, tools);
        let mut attempt = 0u32;

        loop {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::warn!(attempt, "retrying chat request in {:?}", delay);
                tokio::time::sleep(delay).await;
            }

            match self.send_once(&body).await {
                Ok(message) => return Ok(message),
                Err((err, retryable)) if retryable && attempt < self.max_retries => {
                    tracing::warn!("chat request failed: {}", err);
                    attempt += 1;
                }
                Err((err, _)) => return Err(err.into()),
            }
        }
    }
}

/// Extract the first choice's message from a chat-completions response.
pub fn parse_completion(json: &Value) -> Result<ChatMessage, ChatError> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| ChatError::Malformed("missing choices[0].message".to_string()))?;

    serde_json::from_value(message.clone()).map_err(|e| ChatError::Malformed(e.to_string()))
}
