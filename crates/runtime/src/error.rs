use thiserror::Error;

use crate::model::ModelError;

/// Failures that end an `ask` call or prevent a session from being built.
///
/// Tool routing and execution problems are not here: they are fed back to
/// the model as tool results.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown provider kind: {0}")]
    UnknownProviderKind(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to connect to server `{server}`: {source}")]
    Connect {
        server: String,
        #[source]
        source: mcp::Error,
    },

    #[error(transparent)]
    Provider(#[from] ModelError),

    #[error("request cancelled")]
    Cancelled,

    #[error("session is closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
