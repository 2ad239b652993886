//! MCP (Model Context Protocol) client library.
//!
//! This crate provides connections to tool servers over stdio (a spawned
//! child process) or streamable HTTP.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Connection, ServerConfig};
//! use serde_json::{Map, Value};
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ServerConfig::stdio("filesystem", "mcp-server-filesystem", ["./workspace"]);
//! let conn = Connection::open(config).await?;
//!
//! for tool in conn.list_tools().await? {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let mut args = Map::new();
//! args.insert("path".into(), Value::String("./README.md".into()));
//! let result = conn.call_tool("read_file", args).await?;
//! println!("{}", result.text());
//!
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod error;
mod protocol;
mod server;
mod transport;

pub use config::{ServerConfig, TransportConfig};
pub use connection::{Connection, ConnectionState, DEFAULT_TIMEOUT};
pub use error::{Error, Result};
pub use protocol::{
    CallToolResult, InitializeResult, JsonRpcError, ResourceContents, ServerInfo, Tool,
    ToolContent,
};
pub use server::ToolServer;
pub use transport::MAX_OUTPUT_SIZE;
