//! LLM provider backends.
//!
//! Each backend knows three things about its vendor: how tools are
//! declared, how a conversation is put on the wire, and how a reply is
//! read back into a [`Turn`]. Everything else (the tools-less fallback,
//! routing, the conversation loop) is shared.

mod anthropic;
pub mod factory;
mod ollama;
mod openai;

use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;

use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;

use crate::model::{Message, ModelError, Role, ToolSpec, Turn};

pub use anthropic::{AnthropicBackend, AnthropicBackendBuilder};
pub use factory::{ProviderConfig, ProviderKind, create};
pub use ollama::{OllamaBackend, OllamaBackendBuilder};
pub use openai::{OpenAiBackend, OpenAiBackendBuilder};

/// A language-model backend.
pub trait Backend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Translate tool definitions into this backend's declaration shape.
    fn format_tools(&self, tools: &[ToolSpec]) -> Vec<Value>;

    /// Issue one completion request. An empty `tools` slice means the
    /// request carries no tool declarations at all.
    fn request(
        &self,
        messages: &[Message],
        tools: &[Value],
    ) -> impl Future<Output = Result<Value, ModelError>> + Send;

    /// Read a raw reply. Unexpected shapes yield an empty turn.
    fn parse_turn(&self, reply: &Value) -> Turn;

    /// Request a turn, falling back once to a tools-less request when a
    /// request with tools fails. The fallback also rewrites earlier tool
    /// traffic as plain text, which vendors reject without declarations.
    fn send_turn(
        &self,
        messages: &[Message],
        tools: &[Value],
    ) -> impl Future<Output = Result<Turn, ModelError>> + Send {
        let span = tracing::debug_span!(
            "send_turn",
            provider = self.name(),
            messages = messages.len(),
            tools = tools.len()
        );
        async move {
            let reply = match self.request(messages, tools).await {
                Ok(reply) => reply,
                Err(e) if !tools.is_empty() => {
                    tracing::warn!(error = %e, "request with tools failed, retrying without tools");
                    self.request(&plain_transcript(messages), &[]).await?
                }
                Err(e) => return Err(e),
            };
            Ok(self.parse_turn(&reply))
        }
        .instrument(span)
    }
}

/// All supported backends behind one concrete type.
pub enum Provider {
    Anthropic(AnthropicBackend),
    Ollama(OllamaBackend),
    OpenAi(OpenAiBackend),
}

impl Backend for Provider {
    fn name(&self) -> &str {
        match self {
            Self::Anthropic(b) => b.name(),
            Self::Ollama(b) => b.name(),
            Self::OpenAi(b) => b.name(),
        }
    }

    fn format_tools(&self, tools: &[ToolSpec]) -> Vec<Value> {
        match self {
            Self::Anthropic(b) => b.format_tools(tools),
            Self::Ollama(b) => b.format_tools(tools),
            Self::OpenAi(b) => b.format_tools(tools),
        }
    }

    async fn request(&self, messages: &[Message], tools: &[Value]) -> Result<Value, ModelError> {
        match self {
            Self::Anthropic(b) => b.request(messages, tools).await,
            Self::Ollama(b) => b.request(messages, tools).await,
            Self::OpenAi(b) => b.request(messages, tools).await,
        }
    }

    fn parse_turn(&self, reply: &Value) -> Turn {
        match self {
            Self::Anthropic(b) => b.parse_turn(reply),
            Self::Ollama(b) => b.parse_turn(reply),
            Self::OpenAi(b) => b.parse_turn(reply),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic(b) => write!(f, "{b}"),
            Self::Ollama(b) => write!(f, "{b}"),
            Self::OpenAi(b) => write!(f, "{b}"),
        }
    }
}

/// POST a JSON body and decode the JSON reply.
async fn post_json(
    request: reqwest::RequestBuilder,
    body: &impl Serialize,
) -> Result<Value, ModelError> {
    let response = request
        .header("content-type", "application/json")
        .header("accept", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| ModelError::Unreachable(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ModelError::Rejected { status, body });
    }

    response
        .json()
        .await
        .map_err(|e| ModelError::Malformed(e.to_string()))
}

/// Parse a reply into a typed wire struct, logging instead of failing.
fn decode_reply<T: serde::de::DeserializeOwned>(provider: &str, reply: &Value) -> Option<T> {
    match serde_json::from_value(reply.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(provider, error = %e, "unexpected reply shape");
            None
        }
    }
}

/// The transcript with tool calls dropped and tool results turned into
/// user text naming the tool.
fn plain_transcript(messages: &[Message]) -> Cow<'_, [Message]> {
    let has_tool_traffic = messages
        .iter()
        .any(|msg| msg.role == Role::Tool || !msg.tool_calls.is_empty());
    if !has_tool_traffic {
        return Cow::Borrowed(messages);
    }

    let mut names: HashMap<&str, &str> = HashMap::new();
    let mut plain = Vec::with_capacity(messages.len());
    for msg in messages {
        match msg.role {
            Role::User => plain.push(msg.clone()),
            Role::Assistant => {
                for call in &msg.tool_calls {
                    names.insert(&call.id, &call.name);
                }
                plain.push(Message::assistant(msg.content.clone()));
            }
            Role::Tool => {
                let name = msg
                    .tool_call_id
                    .as_deref()
                    .and_then(|id| names.get(id).copied())
                    .unwrap_or("tool");
                let label = if msg.is_error { "failed" } else { "result" };
                plain.push(Message::user(format!("[{name} {label}] {}", msg.content)));
            }
        }
    }
    Cow::Owned(plain)
}

/// Join non-empty text fragments with line breaks.
fn join_text<'a>(fragments: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let joined = fragments
        .into_iter()
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (!joined.is_empty()).then_some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ToolCall, ToolResult};
    use crate::testing::ScriptedBackend;
    use serde_json::{Map, json};

    #[tokio::test]
    async fn send_turn_falls_back_once_without_tools() {
        let backend = ScriptedBackend::new([json!({"text": "plain answer"})]).rejecting_tools();
        let tools = backend.format_tools(&[ToolSpec {
            name: "echo".into(),
            description: String::new(),
            input_schema: json!({"type": "object"}),
        }]);

        let turn = backend
            .send_turn(&[Message::user("hi")], &tools)
            .await
            .unwrap();

        assert_eq!(turn.text.as_deref(), Some("plain answer"));
        assert_eq!(backend.tool_flags(), [true, false]);
    }

    #[tokio::test]
    async fn send_turn_without_tools_does_not_retry() {
        let backend = ScriptedBackend::new([
            Err(ModelError::Rejected {
                status: 500,
                body: "boom".into(),
            }),
            Ok(json!({"text": "never reached"})),
        ]);

        let err = backend
            .send_turn(&[Message::user("hi")], &[])
            .await
            .unwrap_err();

        assert!(matches!(err, ModelError::Rejected { status: 500, .. }));
        assert_eq!(backend.tool_flags(), [false]);
    }

    #[tokio::test]
    async fn fallback_failure_is_surfaced() {
        let backend = ScriptedBackend::new([Err::<Value, _>(ModelError::Unreachable("down".into()))])
            .rejecting_tools();
        let tools = vec![json!({"name": "echo"})];

        let err = backend
            .send_turn(&[Message::user("hi")], &tools)
            .await
            .unwrap_err();

        assert!(matches!(err, ModelError::Unreachable(_)));
        assert_eq!(backend.tool_flags(), [true, false]);
    }

    #[tokio::test]
    async fn fallback_sends_tool_traffic_as_text() {
        let backend = ScriptedBackend::new([json!({"text": "It said hi."})]).rejecting_tools();
        let tools = vec![json!({"name": "echo"})];
        let history = vec![
            Message::user("say hi"),
            Message::assistant_with_calls(
                "Calling echo.",
                vec![ToolCall::new("c1", "echo", Map::new())],
            ),
            Message::tool(ToolResult::success("c1", "hi")),
        ];

        let turn = backend.send_turn(&history, &tools).await.unwrap();

        assert_eq!(turn.text.as_deref(), Some("It said hi."));
        let sent = backend.transcripts();
        assert_eq!(sent[0], history);
        assert_eq!(
            sent[1],
            [
                Message::user("say hi"),
                Message::assistant("Calling echo."),
                Message::user("[echo result] hi"),
            ]
        );
    }

    #[test]
    fn plain_transcript_borrows_when_nothing_changes() {
        let messages = [Message::user("hi"), Message::assistant("hello")];
        assert!(matches!(plain_transcript(&messages), Cow::Borrowed(_)));
    }

    #[test]
    fn join_skips_empty_fragments() {
        assert_eq!(join_text(["a", "", "b"]).as_deref(), Some("a\nb"));
        assert_eq!(join_text(["", ""]), None);
    }
}
