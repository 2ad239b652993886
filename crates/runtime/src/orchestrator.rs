//! The request / execute-tools / resubmit loop.

use mcp::ToolServer;

use crate::error::Result;
use crate::model::{Message, ToolCall, ToolResult};
use crate::providers::Backend;
use crate::tools::ToolCatalog;

/// Outcome of one `ask`.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Every text fragment from the model and every tool note, one per line.
    pub text: String,
    /// The full conversation, including the new query and all tool traffic.
    pub transcript: Vec<Message>,
}

enum State {
    AwaitingModel,
    ExecutingTools(Vec<ToolCall>),
    Done,
}

/// Drives a conversation against one backend.
pub struct Orchestrator<P> {
    provider: P,
    max_tool_rounds: usize,
}

impl<P: Backend> Orchestrator<P> {
    /// `max_tool_rounds` caps how many batches of tool calls are executed
    /// per query.
    pub fn new(provider: P, max_tool_rounds: usize) -> Self {
        Self {
            provider,
            max_tool_rounds,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Answer `query`, continuing from `history`.
    #[tracing::instrument(skip_all, fields(provider = self.provider.name(), tools = catalog.len()))]
    pub async fn run<S: ToolServer>(
        &self,
        catalog: &ToolCatalog<S>,
        history: Vec<Message>,
        query: &str,
    ) -> Result<Answer> {
        let tools = self.provider.format_tools(&catalog.specs());
        let mut transcript = history;
        transcript.push(Message::user(query));

        let mut fragments: Vec<String> = Vec::new();
        let mut rounds = 0;
        let mut state = State::AwaitingModel;

        loop {
            state = match state {
                State::AwaitingModel => {
                    let turn = self.provider.send_turn(&transcript, &tools).await?;
                    let text = turn.text.unwrap_or_default();
                    if !text.is_empty() {
                        fragments.push(text.clone());
                    }

                    if turn.tool_calls.is_empty() {
                        transcript.push(Message::assistant(text));
                        State::Done
                    } else if rounds >= self.max_tool_rounds {
                        tracing::warn!(
                            dropped = turn.tool_calls.len(),
                            rounds,
                            "tool round limit reached, ignoring further tool calls"
                        );
                        transcript.push(Message::assistant(text));
                        State::Done
                    } else {
                        rounds += 1;
                        tracing::debug!(round = rounds, calls = turn.tool_calls.len(), "executing tools");
                        transcript.push(Message::assistant_with_calls(text, turn.tool_calls.clone()));
                        State::ExecutingTools(turn.tool_calls)
                    }
                }
                State::ExecutingTools(calls) => {
                    for call in &calls {
                        let result = catalog.call_tool(call).await;
                        fragments.push(tool_note(call, &result));
                        transcript.push(Message::tool(result));
                    }
                    State::AwaitingModel
                }
                State::Done => break,
            };
        }

        Ok(Answer {
            text: fragments.join("\n"),
            transcript,
        })
    }
}

fn tool_note(call: &ToolCall, result: &ToolResult) -> String {
    if result.is_error {
        format!("[{} failed] {}", call.name, result.content)
    } else {
        format!("[Called {}] {}", call.name, result.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelError, Role};
    use crate::testing::{FakeServer, ScriptedBackend};
    use crate::Error;
    use serde_json::{Value, json};
    use std::sync::Arc;

    async fn catalog(servers: &[Arc<FakeServer>]) -> ToolCatalog<FakeServer> {
        ToolCatalog::build(servers).await
    }

    fn echo_call(id: &str, text: &str) -> Value {
        json!({"id": id, "name": "echo", "arguments": {"text": text}})
    }

    #[tokio::test]
    async fn tool_result_reaches_answer() {
        let server = Arc::new(FakeServer::new("alpha", ["echo"]));
        let catalog = catalog(std::slice::from_ref(&server)).await;
        let backend = ScriptedBackend::new([
            json!({"calls": [echo_call("c1", "hi")]}),
            json!({"text": "The tool said hi."}),
        ]);
        let orchestrator = Orchestrator::new(backend, 1);

        let answer = orchestrator.run(&catalog, Vec::new(), "say hi").await.unwrap();

        assert_eq!(answer.text, "[Called echo] hi\nThe tool said hi.");
        assert!(!answer.text.contains("failed"));
        let roles: Vec<Role> = answer.transcript.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(answer.transcript[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(answer.transcript[2].content, "hi");
    }

    #[tokio::test]
    async fn unknown_tool_is_fed_back_not_fatal() {
        let server = Arc::new(FakeServer::new("alpha", ["echo"]));
        let catalog = catalog(std::slice::from_ref(&server)).await;
        let backend = ScriptedBackend::new([
            json!({"calls": [{"id": "c1", "name": "does_not_exist", "arguments": {}}]}),
            json!({"text": "That tool is unavailable."}),
        ]);
        let orchestrator = Orchestrator::new(backend, 1);

        let answer = orchestrator.run(&catalog, Vec::new(), "do it").await.unwrap();

        let tool_msg = &answer.transcript[2];
        assert_eq!(tool_msg.role, Role::Tool);
        assert!(tool_msg.is_error);
        assert_eq!(tool_msg.content, "unknown tool: does_not_exist");
        assert!(answer.text.ends_with("That tool is unavailable."));

        // The follow-up request saw the error.
        let requests = orchestrator.provider().transcripts();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].last(), Some(tool_msg));
    }

    #[tokio::test]
    async fn calls_run_in_order_and_all_get_results() {
        let server = Arc::new(FakeServer::new("alpha", ["echo"]));
        let catalog = catalog(std::slice::from_ref(&server)).await;
        let backend = ScriptedBackend::new([
            json!({"text": "Echoing twice.", "calls": [echo_call("a", "one"), echo_call("b", "two")]}),
            json!({"text": "Done."}),
        ]);
        let orchestrator = Orchestrator::new(backend, 1);

        let answer = orchestrator.run(&catalog, Vec::new(), "twice").await.unwrap();

        assert_eq!(
            answer.text,
            "Echoing twice.\n[Called echo] one\n[Called echo] two\nDone."
        );
        let ids: Vec<_> = answer
            .transcript
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, ["a", "b"]);
        let args: Vec<_> = server.calls().into_iter().map(|(_, args)| args).collect();
        assert_eq!(args, [json!({"text": "one"}), json!({"text": "two"})]);
    }

    #[tokio::test]
    async fn round_limit_drops_chained_calls() {
        let server = Arc::new(FakeServer::new("alpha", ["echo"]));
        let catalog = catalog(std::slice::from_ref(&server)).await;
        let backend = ScriptedBackend::new([
            json!({"calls": [echo_call("a", "one")]}),
            json!({"text": "One more.", "calls": [echo_call("b", "two")]}),
            json!({"text": "unreachable"}),
        ]);
        let orchestrator = Orchestrator::new(backend, 1);

        let answer = orchestrator.run(&catalog, Vec::new(), "chain").await.unwrap();

        assert_eq!(answer.text, "[Called echo] one\nOne more.");
        assert_eq!(server.calls().len(), 1);
        let last = answer.transcript.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn higher_limit_follows_chains() {
        let server = Arc::new(FakeServer::new("alpha", ["echo"]));
        let catalog = catalog(std::slice::from_ref(&server)).await;
        let backend = ScriptedBackend::new([
            json!({"calls": [echo_call("a", "one")]}),
            json!({"calls": [echo_call("b", "two")]}),
            json!({"text": "All done."}),
        ]);
        let orchestrator = Orchestrator::new(backend, 3);

        let answer = orchestrator.run(&catalog, Vec::new(), "chain").await.unwrap();

        assert_eq!(answer.text, "[Called echo] one\n[Called echo] two\nAll done.");
        assert_eq!(server.calls().len(), 2);
    }

    #[tokio::test]
    async fn provider_failure_ends_the_run() {
        let catalog = catalog(&[]).await;
        let backend = ScriptedBackend::new([Err::<Value, _>(ModelError::Unreachable("down".into()))]);
        let orchestrator = Orchestrator::new(backend, 1);

        let err = orchestrator.run(&catalog, Vec::new(), "hi").await.unwrap_err();

        assert!(matches!(err, Error::Provider(ModelError::Unreachable(_))));
    }

    #[tokio::test]
    async fn history_is_continued() {
        let catalog = catalog(&[]).await;
        let backend = ScriptedBackend::new([json!({"text": "second"})]);
        let orchestrator = Orchestrator::new(backend, 1);
        let history = vec![Message::user("first"), Message::assistant("ok")];

        let answer = orchestrator.run(&catalog, history, "again").await.unwrap();

        assert_eq!(answer.transcript.len(), 4);
        assert_eq!(answer.transcript[2], Message::user("again"));
        assert_eq!(orchestrator.provider().transcripts()[0].len(), 3);
    }

    #[tokio::test]
    async fn silent_model_yields_empty_answer() {
        let catalog = catalog(&[]).await;
        let orchestrator = Orchestrator::new(ScriptedBackend::new(Vec::<Value>::new()), 1);

        let answer = orchestrator.run(&catalog, Vec::new(), "hello?").await.unwrap();

        assert_eq!(answer.text, "");
        assert_eq!(answer.transcript.len(), 2);
    }
}
