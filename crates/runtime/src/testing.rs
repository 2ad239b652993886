//! In-crate fakes for exercising routing and the conversation loop
//! without processes or network access.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use mcp::{CallToolResult, ConnectionState, Tool, ToolContent, ToolServer};
use serde_json::{Map, Value, json};
use tokio::sync::Notify;

use crate::model::{Message, ModelError, ToolCall, ToolSpec, Turn};
use crate::providers::Backend;

/// A tool server whose tools echo their `text` argument.
pub(crate) struct FakeServer {
    name: String,
    tools: Vec<Tool>,
    fail_list: bool,
    fail_calls: bool,
    hang_calls: bool,
    state: Mutex<ConnectionState>,
    calls: Mutex<Vec<(String, Value)>>,
    lists: AtomicUsize,
    closes: AtomicUsize,
    call_started: Notify,
}

impl FakeServer {
    pub fn new<'a>(name: &str, tools: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            name: name.to_string(),
            tools: tools
                .into_iter()
                .map(|tool| Tool {
                    name: tool.to_string(),
                    description: Some(format!("{tool} tool")),
                    input_schema: json!({
                        "type": "object",
                        "properties": {"text": {"type": "string"}}
                    }),
                })
                .collect(),
            fail_list: false,
            fail_calls: false,
            hang_calls: false,
            state: Mutex::new(ConnectionState::Ready),
            calls: Mutex::new(Vec::new()),
            lists: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            call_started: Notify::new(),
        }
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_calls(mut self) -> Self {
        self.fail_calls = true;
        self
    }

    /// Tool calls never complete.
    pub fn hanging_calls(mut self) -> Self {
        self.hang_calls = true;
        self
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Resolves once a tool call has reached this server.
    pub async fn call_started(&self) {
        self.call_started.notified().await;
    }
}

impl ToolServer for FakeServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    async fn list_tools(&self) -> mcp::Result<Vec<Tool>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.fail_list {
            return Err(mcp::Error::ServerExited);
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> mcp::Result<CallToolResult> {
        let text = arguments
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), Value::Object(arguments)));
        self.call_started.notify_one();

        if self.hang_calls {
            std::future::pending::<()>().await;
        }
        if self.fail_calls {
            return Err(mcp::Error::ToolCallFailed(format!("{name} exploded")));
        }
        Ok(CallToolResult {
            content: vec![ToolContent::Text { text }],
            is_error: false,
        })
    }

    async fn close(&self) -> mcp::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Closed);
        Ok(())
    }
}

/// Anything a [`ScriptedBackend`] can be told to answer with.
pub(crate) trait IntoReply {
    fn into_reply(self) -> Result<Value, ModelError>;
}

impl IntoReply for Value {
    fn into_reply(self) -> Result<Value, ModelError> {
        Ok(self)
    }
}

impl IntoReply for Result<Value, ModelError> {
    fn into_reply(self) -> Result<Value, ModelError> {
        self
    }
}

/// A backend that plays back queued replies.
///
/// Replies look like `{"text": "...", "calls": [{"id", "name", "arguments"}]}`.
/// Once the queue is empty every request gets an empty reply.
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<Value, ModelError>>>,
    reject_tools: bool,
    tool_flags: Mutex<Vec<bool>>,
    transcripts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    pub fn new<R: IntoReply>(replies: impl IntoIterator<Item = R>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(IntoReply::into_reply).collect()),
            reject_tools: false,
            tool_flags: Mutex::new(Vec::new()),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    /// Fail every request that declares tools.
    pub fn rejecting_tools(mut self) -> Self {
        self.reject_tools = true;
        self
    }

    /// Whether each request so far carried tool declarations.
    pub fn tool_flags(&self) -> Vec<bool> {
        self.tool_flags.lock().unwrap().clone()
    }

    /// The messages sent with each request so far.
    pub fn transcripts(&self) -> Vec<Vec<Message>> {
        self.transcripts.lock().unwrap().clone()
    }
}

impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn format_tools(&self, tools: &[ToolSpec]) -> Vec<Value> {
        tools.iter().map(|spec| json!({"name": spec.name})).collect()
    }

    async fn request(&self, messages: &[Message], tools: &[Value]) -> Result<Value, ModelError> {
        self.tool_flags.lock().unwrap().push(!tools.is_empty());
        self.transcripts.lock().unwrap().push(messages.to_vec());

        if self.reject_tools && !tools.is_empty() {
            return Err(ModelError::Rejected {
                status: 400,
                body: "tools are not supported".into(),
            });
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})))
    }

    fn parse_turn(&self, reply: &Value) -> Turn {
        let text = reply["text"].as_str().map(str::to_string);
        let tool_calls = reply["calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .map(|call| {
                        ToolCall::from_raw(
                            call["id"].as_str().unwrap_or_default(),
                            call["name"].as_str().unwrap_or_default(),
                            &call["arguments"],
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        Turn { text, tool_calls }
    }
}
