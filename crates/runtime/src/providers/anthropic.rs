//! Anthropic Messages API backend.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Backend, decode_reply, join_text, post_json};
use crate::model::{Message, ModelError, Role, ToolCall, ToolSpec, Turn};

pub const DEFAULT_HOST: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "<[Value]>::is_empty")]
    tools: &'a [Value],
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ApiContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ApiResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an Anthropic backend.
#[derive(Debug, Clone)]
pub struct AnthropicBackendBuilder {
    api_key: String,
    model: String,
    host: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicBackendBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            host: DEFAULT_HOST.to_string(),
            max_tokens: 1000,
            temperature: 0.7,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn build(self) -> AnthropicBackend {
        AnthropicBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            endpoint: format!("{}/v1/messages", self.host.trim_end_matches('/')),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Anthropic API backend.
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicBackend {
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> AnthropicBackendBuilder {
        AnthropicBackendBuilder::new(api_key, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert the transcript. Consecutive tool messages travel together as
    /// `tool_result` blocks in one user message. Assistant messages with
    /// neither text nor calls are dropped, since the API rejects empty
    /// content, and the user messages around them are merged.
    fn messages_to_api(messages: &[Message]) -> Vec<ApiMessage> {
        let mut out: Vec<ApiMessage> = Vec::with_capacity(messages.len());

        for msg in messages {
            match msg.role {
                Role::User => push_user(
                    &mut out,
                    ApiContentBlock::Text {
                        text: msg.content.clone(),
                    },
                ),
                Role::Assistant if msg.tool_calls.is_empty() && msg.content.is_empty() => {}
                Role::Assistant if msg.tool_calls.is_empty() => out.push(ApiMessage {
                    role: "assistant",
                    content: ApiContent::Text(msg.content.clone()),
                }),
                Role::Assistant => {
                    let text = (!msg.content.is_empty()).then(|| ApiContentBlock::Text {
                        text: msg.content.clone(),
                    });
                    let calls = msg.tool_calls.iter().map(|call| ApiContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: Value::Object(call.arguments.clone()),
                    });
                    out.push(ApiMessage {
                        role: "assistant",
                        content: ApiContent::Blocks(text.into_iter().chain(calls).collect()),
                    });
                }
                Role::Tool => push_user(
                    &mut out,
                    ApiContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                        is_error: msg.is_error,
                    },
                ),
            }
        }

        out
    }
}

/// Append to the trailing user message, or start a new one. A lone text
/// block stays in the plain string form.
fn push_user(out: &mut Vec<ApiMessage>, block: ApiContentBlock) {
    match out.last_mut() {
        Some(ApiMessage {
            role: "user",
            content,
        }) => content.push(block),
        _ => out.push(ApiMessage {
            role: "user",
            content: match block {
                ApiContentBlock::Text { text } => ApiContent::Text(text),
                block => ApiContent::Blocks(vec![block]),
            },
        }),
    }
}

impl ApiContent {
    fn push(&mut self, block: ApiContentBlock) {
        match self {
            Self::Blocks(blocks) => blocks.push(block),
            Self::Text(text) => {
                let text = std::mem::take(text);
                *self = Self::Blocks(vec![ApiContentBlock::Text { text }, block]);
            }
        }
    }
}

impl std::fmt::Display for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anthropic({})", self.model)
    }
}

impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn format_tools(&self, tools: &[ToolSpec]) -> Vec<Value> {
        tools
            .iter()
            .map(|spec| {
                json!({
                    "name": spec.name,
                    "description": spec.description,
                    "input_schema": spec.input_schema,
                })
            })
            .collect()
    }

    async fn request(&self, messages: &[Message], tools: &[Value]) -> Result<Value, ModelError> {
        let body = ApiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: Self::messages_to_api(messages),
            tools,
        };

        let req = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION);

        post_json(req, &body).await
    }

    fn parse_turn(&self, reply: &Value) -> Turn {
        let Some(response) = decode_reply::<ApiResponse>(self.name(), reply) else {
            return Turn::default();
        };

        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();
        for block in &response.content {
            match block {
                ApiResponseBlock::Text { text } => texts.push(text.as_str()),
                ApiResponseBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::from_raw(id, name, input));
                }
                ApiResponseBlock::Unknown => {}
            }
        }

        Turn {
            text: join_text(texts),
            tool_calls,
        }
    }
}
