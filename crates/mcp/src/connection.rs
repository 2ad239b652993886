//! Tool-server connections (open, communicate, lifecycle).

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, watch};
use tokio::time::timeout;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, ListToolsParams, ListToolsResult, RequestId, Tool,
};
use crate::server::ToolServer;
use crate::transport::Transport;

/// Default timeout for MCP operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Lifecycle of a connection.
///
/// `Connecting -> Ready -> (Failed) -> Closed`. `Closed` is terminal and is
/// entered exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Failed,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// An open session with one tool server.
pub struct Connection {
    name: String,
    transport: Transport,
    state: watch::Sender<ConnectionState>,
    next_id: AtomicI64,
    timeout: Duration,
    server_info: Mutex<Option<InitializeResult>>,
}

impl Connection {
    /// Spawn or attach to the server and run the `initialize` handshake.
    ///
    /// If anything after the transport comes up fails, the transport is
    /// released before the error is returned.
    #[tracing::instrument(skip_all, fields(server = %config.name, transport = config.transport.kind()))]
    pub async fn open(config: ServerConfig) -> Result<Self> {
        Self::open_with_timeout(config, DEFAULT_TIMEOUT).await
    }

    /// Like [`Connection::open`] with a custom per-request timeout.
    pub async fn open_with_timeout(config: ServerConfig, request_timeout: Duration) -> Result<Self> {
        let transport = Transport::open(&config.transport)?;
        let (state, _) = watch::channel(ConnectionState::Connecting);

        let connection = Self {
            name: config.name,
            transport,
            state,
            next_id: AtomicI64::new(1),
            timeout: request_timeout,
            server_info: Mutex::new(None),
        };

        if let Err(e) = connection.initialize().await {
            connection.state.send_replace(ConnectionState::Failed);
            if let Err(close_err) = connection.close().await {
                tracing::debug!(error = %close_err, "release after failed open");
            }
            return Err(e);
        }

        Ok(connection)
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Get server info (after initialization).
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.server_info.lock().await.clone()
    }

    /// Fetch the server's tool listing, following pagination cursors.
    #[tracing::instrument(skip(self), fields(server = %self.name))]
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.ensure_ready()?;

        let mut tools = Vec::new();
        let mut cursor = None;
        loop {
            let params = ListToolsParams { cursor };
            let page: ListToolsResult = self.request("tools/list", Some(params)).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(count = tools.len(), "listed tools");
        Ok(tools)
    }

    /// Call a tool by name.
    ///
    /// A result flagged `isError` by the server becomes
    /// [`Error::ToolCallFailed`] carrying the flattened text.
    #[tracing::instrument(skip(self, arguments), fields(server = %self.name))]
    pub async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<CallToolResult> {
        self.ensure_ready()?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            return Err(Error::ToolCallFailed(result.text()));
        }

        Ok(result)
    }

    /// Release the transport. Idempotent: only the first call does any work.
    pub async fn close(&self) -> Result<()> {
        let previous = self.state.send_replace(ConnectionState::Closed);
        if previous == ConnectionState::Closed {
            return Ok(());
        }

        tracing::info!(server = %self.name, "closing connection");
        self.transport.close().await
    }

    // --- Internal methods ---

    async fn initialize(&self) -> Result<()> {
        let result: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()))
            .await?;

        self.transport
            .notify(&JsonRpcNotification::new("notifications/initialized"))
            .await?;

        tracing::info!(
            server = %self.name,
            remote = %result.server_info.name,
            protocol = %result.protocol_version,
            "connected"
        );

        *self.server_info.lock().await = Some(result);
        self.state.send_replace(ConnectionState::Ready);
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Connecting => Err(Error::NotInitialized),
            ConnectionState::Closed => Err(Error::Closed),
            state => Err(Error::NotReady { state }),
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let params = params.map(serde_json::to_value).transpose()?;
        let request = JsonRpcRequest::new(self.next_request_id(), method).with_params(params);

        let response = timeout(self.timeout, self.transport.request(&request))
            .await
            .map_err(|_| Error::Timeout)?
            .inspect_err(|e| {
                if e.is_fatal() {
                    tracing::warn!(server = %self.name, error = %e, "connection failed");
                    self.state.send_if_modified(|state| {
                        let live = matches!(state, ConnectionState::Ready | ConnectionState::Connecting);
                        if live {
                            *state = ConnectionState::Failed;
                        }
                        live
                    });
                }
            })?;

        let result = response.into_result()?;
        Ok(serde_json::from_value(result)?)
    }
}

impl ToolServer for Connection {
    fn name(&self) -> &str {
        Connection::name(self)
    }

    fn state(&self) -> ConnectionState {
        Connection::state(self)
    }

    async fn list_tools(&self) -> Result<Vec<Tool>> {
        Connection::list_tools(self).await
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<CallToolResult> {
        Connection::call_tool(self, name, arguments).await
    }

    async fn close(&self) -> Result<()> {
        Connection::close(self).await
    }
}
