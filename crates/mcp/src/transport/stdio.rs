//! Child-process transport: newline-delimited JSON-RPC over stdin/stdout.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};

/// Maximum size of a single reply line (1MB).
/// Sized for large tool outputs (file reads, search results).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// How long a server gets to exit on its own after stdin closes.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

pub(crate) struct StdioTransport {
    process: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<BufReader<ChildStdout>>,
}

impl StdioTransport {
    /// Spawn the server process with piped stdio.
    pub(crate) fn spawn(command: &str, args: &[String], env: &HashMap<String, String>) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn()?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdout")))?;

        Ok(Self {
            process: Mutex::new(process),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(BufReader::new(stdout)),
        })
    }

    pub(crate) async fn request(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        // Holding stdout for the whole exchange keeps replies paired with requests.
        let mut stdout = self.stdout.lock().await;
        self.write_line(&serde_json::to_string(request)?).await?;
        read_response(&mut stdout, &request.id).await
    }

    pub(crate) async fn notify(&self, notification: &JsonRpcNotification) -> Result<()> {
        self.write_line(&serde_json::to_string(notification)?).await
    }

    /// Close stdin, give the server a moment to exit, then kill it.
    pub(crate) async fn close(&self) -> Result<()> {
        drop(self.stdin.lock().await.take());

        let mut process = self.process.lock().await;
        match timeout(SHUTDOWN_GRACE, process.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(%status, "server process exited");
                Ok(())
            }
            _ => {
                process.kill().await?;
                Ok(())
            }
        }
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        let stdin = stdin.as_mut().ok_or(Error::Closed)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }
}

/// Read lines until the reply for `id` shows up.
///
/// Server-initiated notifications and requests, blank lines, and replies to
/// earlier (timed out) requests are skipped.
async fn read_response(
    stdout: &mut BufReader<ChildStdout>,
    id: &RequestId,
) -> Result<JsonRpcResponse> {
    loop {
        // The cap applies while reading, so an endless line never gets buffered.
        let mut line = Vec::new();
        let bytes_read = (&mut *stdout)
            .take(MAX_OUTPUT_SIZE as u64 + 1)
            .read_until(b'\n', &mut line)
            .await?;
        if bytes_read == 0 {
            return Err(Error::ServerExited);
        }
        if line.len() > MAX_OUTPUT_SIZE {
            return Err(Error::OutputTooLarge {
                max: MAX_OUTPUT_SIZE,
            });
        }

        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }

        let message: Value = serde_json::from_slice(line)
            .map_err(|e| Error::InvalidResponse(format!("malformed JSON from server: {e}")))?;
        if message.get("method").is_some() || message.get("id").is_none() {
            tracing::debug!(%message, "ignoring server-initiated message");
            continue;
        }

        let response: JsonRpcResponse = serde_json::from_value(message)?;
        if &response.id != id {
            tracing::debug!(expected = ?id, got = ?response.id, "ignoring stale response");
            continue;
        }
        return Ok(response);
    }
}
