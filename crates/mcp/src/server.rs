//! The seam between tool routing and concrete connections.

use std::future::Future;

use serde_json::{Map, Value};

use crate::connection::ConnectionState;
use crate::error::Result;
use crate::protocol::{CallToolResult, Tool};

/// Anything that can list and execute tools on behalf of a session.
///
/// [`crate::Connection`] is the production implementation; tests plug in
/// scripted servers.
pub trait ToolServer: Send + Sync {
    /// Server identifier, unique within a session.
    fn name(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Fetch the server's tool listing.
    fn list_tools(&self) -> impl Future<Output = Result<Vec<Tool>>> + Send;

    /// Execute a tool.
    fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> impl Future<Output = Result<CallToolResult>> + Send;

    /// Release the underlying transport. Must be idempotent.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}
