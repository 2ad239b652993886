use thiserror::Error;

/// Errors that can occur while routing or executing a tool call.
///
/// These never abort a conversation: they are rendered into the tool
/// message the model sees next.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool `{tool}` belongs to server `{server}`, which is not ready")]
    Routing { tool: String, server: String },

    #[error("tool call failed: {0}")]
    CallFailed(String),

    #[error("invalid arguments for `{tool}`: {reason}")]
    ArgumentDecode { tool: String, reason: String },
}

impl From<mcp::Error> for ToolError {
    fn from(e: mcp::Error) -> Self {
        match e {
            mcp::Error::ToolCallFailed(message) => Self::CallFailed(message),
            other => Self::CallFailed(other.to_string()),
        }
    }
}
