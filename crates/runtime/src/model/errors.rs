use thiserror::Error;

/// A failed completion request.
///
/// Once the tools-less retry has failed too, this ends the `ask` that
/// issued it.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The provider could not be reached or the connection dropped.
    #[error("could not reach provider: {0}")]
    Unreachable(String),

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The reply body was not JSON.
    #[error("provider reply is not JSON: {0}")]
    Malformed(String),
}
