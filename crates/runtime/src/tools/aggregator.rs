//! Cached access to the tool catalog.

use std::sync::Arc;

use mcp::ToolServer;
use tokio::sync::Mutex;

use super::catalog::ToolCatalog;

/// Caches the merged catalog for a set of servers until invalidated.
pub struct ToolAggregator<S> {
    cache: Mutex<Option<Arc<ToolCatalog<S>>>>,
}

impl<S> Default for ToolAggregator<S> {
    fn default() -> Self {
        Self {
            cache: Mutex::new(None),
        }
    }
}

impl<S: ToolServer> ToolAggregator<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached snapshot, built from `servers` on first use.
    pub async fn catalog(&self, servers: &[Arc<S>]) -> Arc<ToolCatalog<S>> {
        let mut cache = self.cache.lock().await;
        if let Some(catalog) = cache.as_ref() {
            return Arc::clone(catalog);
        }

        let catalog = Arc::new(ToolCatalog::build(servers).await);
        tracing::debug!(tools = catalog.len(), "tool catalog rebuilt");
        *cache = Some(Arc::clone(&catalog));
        catalog
    }

    /// Drop the cached snapshot; the next `catalog` call rebuilds it.
    pub async fn invalidate(&self) {
        self.cache.lock().await.take();
    }
}
