//! Switchboard runtime: tool routing and model orchestration.
//!
//! This crate turns a set of MCP tool servers and a language model into a
//! question-answering session.
//!
//! # Overview
//!
//! - **ToolCatalog**: the merged tool listing of every server, with each
//!   tool routed to the server that exposes it.
//! - **Backend**: a language-model provider (Anthropic, Ollama, OpenAI)
//!   that declares tools, sends a conversation, and parses the reply.
//! - **Orchestrator**: the loop that asks the model, executes requested
//!   tools, and feeds results back until the model answers.
//! - **Session**: owns the server connections and the orchestrator.
//!
//! # Example
//!
//! ```no_run
//! use mcp::ServerConfig;
//! use runtime::{ProviderConfig, ProviderKind, Session, SessionConfig, SessionOptions};
//!
//! # async fn example() -> runtime::Result<()> {
//! let config = SessionConfig {
//!     servers: vec![ServerConfig::stdio("files", "mcp-server-filesystem", ["."])],
//!     provider: "ollama".parse::<ProviderKind>()?,
//!     provider_config: ProviderConfig::default(),
//!     options: SessionOptions::default(),
//! };
//!
//! let session = Session::connect(config).await?;
//! for failure in session.connect_failures() {
//!     eprintln!("{} unavailable: {}", failure.server, failure.error);
//! }
//!
//! let answer = session.ask("What is in README.md?").await?;
//! println!("{}", answer.text);
//!
//! session.close().await;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod model;
mod orchestrator;
pub mod providers;
mod session;
pub mod tools;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use model::{Message, ModelError, Role, ToolCall, ToolResult, ToolSpec, Turn};
pub use orchestrator::{Answer, Orchestrator};
pub use providers::{Backend, Provider, ProviderConfig, ProviderKind};
pub use session::{Session, SessionConfig, SessionOptions};
pub use tools::{ServerFailure, ToolAggregator, ToolCatalog, ToolDescriptor, ToolError};
