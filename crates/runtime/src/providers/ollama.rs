//! Ollama chat API backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{Backend, decode_reply, post_json};
use crate::model::{Message, ModelError, Role, ToolCall, ToolSpec, Turn};

pub const DEFAULT_HOST: &str = "http://localhost:11434";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "<[Value]>::is_empty")]
    tools: &'a [Value],
    options: ApiOptions,
}

#[derive(Debug, Serialize)]
struct ApiOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiToolCall<'a> {
    function: ApiFunctionCall<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionCall<'a> {
    name: &'a str,
    arguments: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    message: Option<ApiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    /// Compatible servers send `null` on text-only replies.
    #[serde(default)]
    tool_calls: Option<Vec<ApiResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ApiResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ApiResponseFunction {
    name: String,
    /// Either a decoded object or a JSON string, depending on the model.
    #[serde(default)]
    arguments: Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an Ollama backend.
#[derive(Debug, Clone)]
pub struct OllamaBackendBuilder {
    model: String,
    host: String,
    max_tokens: u32,
    temperature: f32,
}

impl OllamaBackendBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
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

    pub fn build(self) -> OllamaBackend {
        OllamaBackend {
            client: reqwest::Client::new(),
            model: self.model,
            endpoint: format!("{}/api/chat", self.host.trim_end_matches('/')),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Ollama backend, for models served locally.
pub struct OllamaBackend {
    client: reqwest::Client,
    model: String,
    endpoint: String,
    max_tokens: u32,
    temperature: f32,
}

impl OllamaBackend {
    pub fn builder(model: impl Into<String>) -> OllamaBackendBuilder {
        OllamaBackendBuilder::new(model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn message_to_api(msg: &Message) -> ApiMessage<'_> {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        ApiMessage {
            role,
            content: &msg.content,
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| ApiToolCall {
                    function: ApiFunctionCall {
                        name: &call.name,
                        arguments: &call.arguments,
                    },
                })
                .collect(),
        }
    }
}

impl std::fmt::Display for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ollama({})", self.model)
    }
}

impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn format_tools(&self, tools: &[ToolSpec]) -> Vec<Value> {
        tools.iter().map(function_declaration).collect()
    }

    async fn request(&self, messages: &[Message], tools: &[Value]) -> Result<Value, ModelError> {
        let body = ApiRequest {
            model: &self.model,
            messages: messages.iter().map(Self::message_to_api).collect(),
            stream: false,
            tools,
            options: ApiOptions {
                num_predict: self.max_tokens,
                temperature: self.temperature,
            },
        };

        post_json(self.client.post(&self.endpoint), &body).await
    }

    fn parse_turn(&self, reply: &Value) -> Turn {
        let Some(message) = decode_reply::<ApiResponse>(self.name(), reply).and_then(|r| r.message)
        else {
            return Turn::default();
        };

        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .iter()
            .map(|call| {
                // Ollama usually omits ids; results still need a correlation key.
                let id = call
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                ToolCall::from_raw(id, &call.function.name, &call.function.arguments)
            })
            .collect();

        Turn {
            text: message.content.filter(|text| !text.is_empty()),
            tool_calls,
        }
    }
}

/// The `{type: "function", function: {...}}` declaration shared by the
/// Ollama and OpenAI chat APIs.
pub(super) fn function_declaration(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.input_schema,
        }
    })
}
