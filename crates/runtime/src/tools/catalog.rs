//! A merged, routable snapshot of every server's tools.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use mcp::{ConnectionState, ToolServer};

use super::errors::ToolError;
use crate::model::{ToolCall, ToolResult, ToolSpec};

/// A tool together with the name of the server that exposes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub spec: ToolSpec,
    pub server: String,
}

/// A server that could not be reached, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFailure {
    pub server: String,
    pub error: String,
}

/// A tool name exposed by more than one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shadowed {
    pub tool: String,
    /// Server whose tool is no longer reachable by this name.
    pub hidden: String,
    /// Server the name now routes to.
    pub winner: String,
}

struct Entry<S> {
    descriptor: ToolDescriptor,
    owner: Weak<S>,
}

/// Immutable snapshot of the tools exposed by a set of servers.
///
/// The catalog only holds weak references: servers are owned by the
/// session, and a tool whose server has gone away fails to route.
pub struct ToolCatalog<S> {
    entries: Vec<Entry<S>>,
    index: HashMap<String, usize>,
    shadowed: Vec<Shadowed>,
    failed: Vec<ServerFailure>,
}

impl<S> Default for ToolCatalog<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            shadowed: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<S: ToolServer> ToolCatalog<S> {
    /// List every server's tools and merge them into one namespace.
    ///
    /// A server whose listing fails contributes no tools; the failure is
    /// recorded and logged. When two servers expose the same name, the later
    /// server wins.
    pub async fn build(servers: &[Arc<S>]) -> Self {
        let mut catalog = Self::default();

        for server in servers {
            match server.list_tools().await {
                Ok(tools) => {
                    tracing::info!(server = server.name(), count = tools.len(), "tools discovered");
                    for tool in tools {
                        catalog.insert(server, ToolSpec::from(tool));
                    }
                }
                Err(e) => {
                    tracing::warn!(server = server.name(), error = %e, "failed to list tools");
                    catalog.failed.push(ServerFailure {
                        server: server.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        catalog
    }

    fn insert(&mut self, server: &Arc<S>, spec: ToolSpec) {
        let entry = Entry {
            descriptor: ToolDescriptor {
                spec,
                server: server.name().to_string(),
            },
            owner: Arc::downgrade(server),
        };

        match self.index.get(&entry.descriptor.spec.name) {
            Some(&slot) => {
                let previous = std::mem::replace(&mut self.entries[slot], entry);
                let current = &self.entries[slot].descriptor;
                tracing::warn!(
                    tool = %current.spec.name,
                    hidden = %previous.descriptor.server,
                    winner = %current.server,
                    "tool name exposed by more than one server"
                );
                self.shadowed.push(Shadowed {
                    tool: current.spec.name.clone(),
                    hidden: previous.descriptor.server,
                    winner: current.server.clone(),
                });
            }
            None => {
                self.index
                    .insert(entry.descriptor.spec.name.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Resolve a tool name to the server that owns it.
    pub fn route(&self, name: &str) -> Result<Arc<S>, ToolError> {
        let entry = self
            .index
            .get(name)
            .map(|&slot| &self.entries[slot])
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        entry
            .owner
            .upgrade()
            .filter(|server| server.state() == ConnectionState::Ready)
            .ok_or_else(|| ToolError::Routing {
                tool: name.to_string(),
                server: entry.descriptor.server.clone(),
            })
    }

    /// Route and execute one call. Failures come back as an error result.
    #[tracing::instrument(skip_all, fields(tool = %call.name, id = %call.id))]
    pub async fn call_tool(&self, call: &ToolCall) -> ToolResult {
        let outcome = self.invoke(call).await;

        match (&call.decode_error, outcome) {
            (None, Ok(text)) => ToolResult::success(&call.id, text),
            (None, Err(e)) => {
                tracing::warn!(error = %e, "tool call failed");
                ToolResult::error(&call.id, e.to_string())
            }
            // The tool still ran, with empty arguments; the model sees both.
            (Some(reason), outcome) => {
                let note = ToolError::ArgumentDecode {
                    tool: call.name.clone(),
                    reason: reason.clone(),
                }
                .to_string();
                let detail = match outcome {
                    Ok(text) => text,
                    Err(e) => e.to_string(),
                };
                tracing::warn!(%note, "tool called without its arguments");
                if detail.is_empty() {
                    ToolResult::error(&call.id, note)
                } else {
                    ToolResult::error(&call.id, format!("{note}\n{detail}"))
                }
            }
        }
    }

    async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
        let server = self.route(&call.name)?;
        let result = server.call_tool(&call.name, call.arguments.clone()).await?;
        Ok(result.text())
    }
}

impl<S> ToolCatalog<S> {
    /// Tool definitions in catalog order, as handed to providers.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.entries
            .iter()
            .map(|entry| entry.descriptor.spec.clone())
            .collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names that resolved to a later server during the merge.
    pub fn shadowed(&self) -> &[Shadowed] {
        &self.shadowed
    }

    /// Servers whose listing failed while building this snapshot.
    pub fn failed(&self) -> &[ServerFailure] {
        &self.failed
    }
}
