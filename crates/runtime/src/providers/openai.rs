//! OpenAI chat completions backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ollama::function_declaration;
use super::{Backend, decode_reply, post_json};
use crate::model::{Message, ModelError, Role, ToolCall, ToolSpec, Turn};

pub const DEFAULT_HOST: &str = "https://api.openai.com/v1";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "<[Value]>::is_empty")]
    tools: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    /// `null` for assistant turns that only call tools.
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ApiToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: ApiFunctionCall<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionCall<'a> {
    name: &'a str,
    /// Always a JSON-encoded string on this API.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
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
    id: String,
    function: ApiResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ApiResponseFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    api_key: String,
    model: String,
    host: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiBackendBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            host: DEFAULT_HOST.to_string(),
            max_tokens: 1000,
            temperature: 0.7,
        }
    }

    /// Base URL including the version segment, e.g. `https://api.openai.com/v1`.
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

    pub fn build(self) -> OpenAiBackend {
        OpenAiBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            endpoint: format!("{}/chat/completions", self.host.trim_end_matches('/')),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// OpenAI API backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiBackend {
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(api_key, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn message_to_api(msg: &Message) -> ApiMessage<'_> {
        let (role, content) = match msg.role {
            Role::User => ("user", Some(msg.content.as_str())),
            Role::Assistant if !msg.tool_calls.is_empty() && msg.content.is_empty() => {
                ("assistant", None)
            }
            Role::Assistant => ("assistant", Some(msg.content.as_str())),
            Role::Tool => ("tool", Some(msg.content.as_str())),
        };

        ApiMessage {
            role,
            content,
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| ApiToolCall {
                    id: &call.id,
                    call_type: "function",
                    function: ApiFunctionCall {
                        name: &call.name,
                        arguments: Value::Object(call.arguments.clone()).to_string(),
                    },
                })
                .collect(),
            tool_call_id: msg.tool_call_id.as_deref(),
        }
    }
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({})", self.model)
    }
}

impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn format_tools(&self, tools: &[ToolSpec]) -> Vec<Value> {
        tools.iter().map(function_declaration).collect()
    }

    async fn request(&self, messages: &[Message], tools: &[Value]) -> Result<Value, ModelError> {
        let body = ApiRequest {
            model: &self.model,
            messages: messages.iter().map(Self::message_to_api).collect(),
            tools,
            tool_choice: (!tools.is_empty()).then_some("auto"),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let req = self.client.post(&self.endpoint).bearer_auth(&self.api_key);
        post_json(req, &body).await
    }

    fn parse_turn(&self, reply: &Value) -> Turn {
        let Some(message) = decode_reply::<ApiResponse>(self.name(), reply)
            .and_then(|r| r.choices.into_iter().next())
            .map(|choice| choice.message)
        else {
            return Turn::default();
        };

        Turn {
            text: message.content.filter(|text| !text.is_empty()),
            tool_calls: message
                .tool_calls
                .unwrap_or_default()
                .iter()
                .map(|call| ToolCall::from_raw(&call.id, &call.function.name, &call.function.arguments))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolResult;
    use serde_json::{Map, json};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn echo_spec() -> ToolSpec {
        ToolSpec {
            name: "echo".into(),
            description: "Echo text".into(),
            input_schema: json!({"type": "object"}),
        }
    }

    fn reply_with_call(name: &str, arguments: Value) -> Value {
        json!({"choices": [{"message": {
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_abc",
                "type": "function",
                "function": {"name": name, "arguments": arguments}
            }]
        }}]})
    }

    #[test]
    fn string_arguments_round_trip() {
        let backend = OpenAiBackend::builder("key", "gpt-4o").build();
        let tools = backend.format_tools(&[echo_spec()]);
        let name = tools[0]["function"]["name"].as_str().unwrap();

        let turn = backend.parse_turn(&reply_with_call(name, json!("{\"text\":\"hi\"}")));

        assert_eq!(turn.text, None);
        assert_eq!(turn.tool_calls[0].id, "call_abc");
        assert_eq!(turn.tool_calls[0].name, "echo");
        assert_eq!(Value::Object(turn.tool_calls[0].arguments.clone()), json!({"text": "hi"}));
    }

    #[test]
    fn decoded_arguments_are_tolerated() {
        let backend = OpenAiBackend::builder("key", "gpt-4o").build();
        let turn = backend.parse_turn(&reply_with_call("echo", json!({"text": "hi"})));
        assert_eq!(turn.tool_calls[0].arguments["text"], "hi");
    }

    #[test]
    fn null_tool_calls_keep_the_text() {
        let backend = OpenAiBackend::builder("key", "gpt-4o").build();
        let reply = json!({"choices": [{"message": {"content": "hello", "tool_calls": null}}]});

        let turn = backend.parse_turn(&reply);

        assert_eq!(turn.text.as_deref(), Some("hello"));
        assert!(turn.tool_calls.is_empty());
    }

    #[test]
    fn empty_choices_are_an_empty_turn() {
        let backend = OpenAiBackend::builder("key", "gpt-4o").build();
        assert_eq!(backend.parse_turn(&json!({"choices": []})), Turn::default());
        assert_eq!(backend.parse_turn(&json!({"object": "error"})), Turn::default());
    }

    #[test]
    fn tool_turns_encode_arguments_as_strings() {
        let mut args = Map::new();
        args.insert("text".into(), json!("hi"));
        let call_msg = Message::assistant_with_calls("", vec![ToolCall::new("call_1", "echo", args)]);
        let result_msg = Message::tool(ToolResult::success("call_1", "hi"));

        let call = serde_json::to_value(OpenAiBackend::message_to_api(&call_msg)).unwrap();
        let result = serde_json::to_value(OpenAiBackend::message_to_api(&result_msg)).unwrap();

        assert_eq!(call["content"], Value::Null);
        assert_eq!(call["tool_calls"][0]["type"], "function");
        assert_eq!(call["tool_calls"][0]["function"]["arguments"], "{\"text\":\"hi\"}");
        assert_eq!(
            result,
            json!({"role": "tool", "content": "hi", "tool_call_id": "call_1"})
        );
    }

    #[tokio::test]
    async fn request_declares_tools_with_auto_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"tool_choice": "auto", "model": "gpt-4o"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "done"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAiBackend::builder("sk-test", "gpt-4o")
            .host(server.uri())
            .build();
        let tools = backend.format_tools(&[echo_spec()]);
        let turn = backend
            .send_turn(&[Message::user("hi")], &tools)
            .await
            .unwrap();

        assert_eq!(turn.text.as_deref(), Some("done"));
    }
}
