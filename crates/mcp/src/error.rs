//! MCP error types.

use crate::connection::ConnectionState;
use crate::protocol::JsonRpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("server I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("server not initialized")]
    NotInitialized,

    #[error("server exited unexpectedly")]
    ServerExited,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("tool call failed: {0}")]
    ToolCallFailed(String),

    #[error("server reply exceeds {max} bytes")]
    OutputTooLarge { max: usize },

    #[error("http transport: {0}")]
    Http(String),

    #[error("connection closed")]
    Closed,

    #[error("connection not ready (state: {state})")]
    NotReady { state: ConnectionState },
}

impl Error {
    /// Whether this error means the transport itself is gone.
    ///
    /// A connection that hits one of these moves to `Failed`; protocol-level
    /// errors (a JSON-RPC error reply, a tool reporting failure) leave it usable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::ServerExited | Error::OutputTooLarge { .. } | Error::Http(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
