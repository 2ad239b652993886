//! Sessions: a server set, a provider and the conversation loop,
//! opened together and closed together.

use std::collections::HashSet;
use std::sync::Arc;

use mcp::{Connection, ServerConfig, ToolServer};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::model::Message;
use crate::orchestrator::{Answer, Orchestrator};
use crate::providers::{self, Backend, Provider, ProviderConfig, ProviderKind};
use crate::tools::{ServerFailure, ToolAggregator, ToolCatalog};

/// Behavior knobs for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Batches of tool calls executed per query before the model's
    /// further requests are ignored.
    pub max_tool_rounds: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { max_tool_rounds: 1 }
    }
}

/// Everything needed to open a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub servers: Vec<ServerConfig>,
    pub provider: ProviderKind,
    pub provider_config: ProviderConfig,
    pub options: SessionOptions,
}

/// A set of tool servers and a model, for the lifetime of a client.
///
/// Queries take the server set's read lock for their whole duration;
/// adding or removing servers and closing take the write lock. Closing
/// cancels in-flight queries first so it never waits on a slow model.
pub struct Session<P = Provider, S = Connection> {
    servers: RwLock<Vec<Arc<S>>>,
    aggregator: ToolAggregator<S>,
    orchestrator: Orchestrator<P>,
    connect_failures: Vec<ServerFailure>,
    cancel: CancellationToken,
}

impl Session {
    /// Build the provider, then connect to every server in order.
    ///
    /// Servers that fail to connect are skipped and reported through
    /// [`Session::connect_failures`]. Provider and configuration errors are
    /// raised before any server is contacted.
    #[tracing::instrument(skip_all, fields(provider = %config.provider, servers = config.servers.len()))]
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let provider = providers::create(config.provider, &config.provider_config)?;

        let mut seen = HashSet::new();
        if let Some(dup) = config.servers.iter().find(|s| !seen.insert(s.name.clone())) {
            return Err(Error::Config(format!("duplicate server name `{}`", dup.name)));
        }

        let mut servers = Vec::with_capacity(config.servers.len());
        let mut failures = Vec::new();
        for server in config.servers {
            let name = server.name.clone();
            match Connection::open(server).await {
                Ok(conn) => servers.push(Arc::new(conn)),
                Err(e) => {
                    tracing::warn!(server = %name, error = %e, "failed to connect, skipping");
                    failures.push(ServerFailure {
                        server: name,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            connected = servers.len(),
            failed = failures.len(),
            "session ready"
        );

        let mut session = Self::from_parts(provider, servers, config.options);
        session.connect_failures = failures;
        Ok(session)
    }

    /// Connect to one more server.
    pub async fn add_server(&self, config: ServerConfig) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        if self.server_names().await.contains(&config.name) {
            return Err(Error::Config(format!("duplicate server name `{}`", config.name)));
        }

        let name = config.name.clone();
        let conn = Connection::open(config)
            .await
            .map_err(|source| Error::Connect { server: name, source })?;
        self.insert_server(Arc::new(conn)).await
    }
}

impl<P: Backend, S: ToolServer> Session<P, S> {
    /// Assemble a session from already-open servers.
    pub fn from_parts(provider: P, servers: Vec<Arc<S>>, options: SessionOptions) -> Self {
        Self {
            servers: RwLock::new(servers),
            aggregator: ToolAggregator::new(),
            orchestrator: Orchestrator::new(provider, options.max_tool_rounds),
            connect_failures: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Servers that could not be reached when the session was opened.
    pub fn connect_failures(&self) -> &[ServerFailure] {
        &self.connect_failures
    }

    pub fn provider(&self) -> &P {
        self.orchestrator.provider()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn server_names(&self) -> Vec<String> {
        self.servers
            .read()
            .await
            .iter()
            .map(|server| server.name().to_string())
            .collect()
    }

    /// The merged tool catalog, built on first use.
    pub async fn catalog(&self) -> Result<Arc<ToolCatalog<S>>> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let servers = self.servers.read().await;
        Ok(self.aggregator.catalog(&servers).await)
    }

    /// Add an already-open server. Names must stay unique.
    pub async fn insert_server(&self, server: Arc<S>) -> Result<()> {
        let mut servers = self.servers.write().await;
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        if servers.iter().any(|s| s.name() == server.name()) {
            return Err(Error::Config(format!(
                "duplicate server name `{}`",
                server.name()
            )));
        }

        tracing::info!(server = server.name(), "server added");
        servers.push(server);
        self.aggregator.invalidate().await;
        Ok(())
    }

    /// Close and forget a server. Returns `false` if no server has that name.
    pub async fn remove_server(&self, name: &str) -> Result<bool> {
        let mut servers = self.servers.write().await;
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let Some(pos) = servers.iter().position(|s| s.name() == name) else {
            return Ok(false);
        };

        let server = servers.remove(pos);
        self.aggregator.invalidate().await;
        drop(servers);

        if let Err(e) = server.close().await {
            tracing::warn!(server = name, error = %e, "error closing removed server");
        }
        tracing::info!(server = name, "server removed");
        Ok(true)
    }

    /// Answer a single query with a fresh conversation.
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        self.ask_with_history(Vec::new(), query).await
    }

    /// Answer a query as the next turn of a retained transcript.
    pub async fn ask_with_history(&self, history: Vec<Message>, query: &str) -> Result<Answer> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }

        let work = async {
            let servers = self.servers.read().await;
            let catalog = self.aggregator.catalog(&servers).await;
            self.orchestrator.run(&catalog, history, query).await
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = work => result,
        }
    }

    /// Cancel in-flight queries and close every server.
    ///
    /// Every server is attempted even if some fail; failures are logged and
    /// returned. Calling this again is a no-op.
    pub async fn close(&self) -> Vec<ServerFailure> {
        self.cancel.cancel();

        let servers = std::mem::take(&mut *self.servers.write().await);
        self.aggregator.invalidate().await;

        let mut failures = Vec::new();
        for server in servers {
            if let Err(e) = server.close().await {
                tracing::warn!(server = server.name(), error = %e, "error closing server");
                failures.push(ServerFailure {
                    server: server.name().to_string(),
                    error: e.to_string(),
                });
            }
        }

        tracing::info!(failures = failures.len(), "session closed");
        failures
    }
}
