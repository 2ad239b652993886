//! Wire transports for the session protocol.

mod http;
mod stdio;

pub use stdio::MAX_OUTPUT_SIZE;

use crate::config::TransportConfig;
use crate::error::Result;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

use self::http::HttpTransport;
use self::stdio::StdioTransport;

pub(crate) enum Transport {
    Stdio(StdioTransport),
    Http(HttpTransport),
}

impl Transport {
    /// Spawn or attach according to the descriptor. No protocol traffic yet.
    pub(crate) fn open(config: &TransportConfig) -> Result<Self> {
        match config {
            TransportConfig::Stdio { command, args, env } => {
                Ok(Self::Stdio(StdioTransport::spawn(command, args, env)?))
            }
            TransportConfig::Http { url, headers } => Ok(Self::Http(HttpTransport::new(url, headers))),
        }
    }

    pub(crate) async fn request(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        match self {
            Self::Stdio(t) => t.request(request).await,
            Self::Http(t) => t.request(request).await,
        }
    }

    pub(crate) async fn notify(&self, notification: &JsonRpcNotification) -> Result<()> {
        match self {
            Self::Stdio(t) => t.notify(notification).await,
            Self::Http(t) => t.notify(notification).await,
        }
    }

    pub(crate) async fn close(&self) -> Result<()> {
        match self {
            Self::Stdio(t) => t.close().await,
            Self::Http(t) => t.close().await,
        }
    }
}
