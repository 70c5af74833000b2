//! Error taxonomy for a single proxy cycle.
//!
//! Every variant is local to one connection except [`ProxyError::AcceptorFault`],
//! which ends the accept loop.

use thiserror::Error;

/// Errors produced while serving a connection.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request or response could not be framed or parsed.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Connecting to or reading from the target host failed.
    #[error("upstream {target} unavailable: {source}")]
    UpstreamUnavailable {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The upstream sent something that is not a well-framed HTTP response.
    #[error("bad upstream response: {0}")]
    BadUpstreamResponse(String),

    /// Token extraction or the classifier call failed.
    #[error("classification failed: {0}")]
    ClassificationFailure(String),

    /// A synthetic page template could not be rendered.
    #[error("render failed: {0}")]
    RenderFailure(#[from] crate::render::RenderError),

    /// The accept loop hit an error that was not a deliberate shutdown.
    #[error("acceptor fault: {0}")]
    AcceptorFault(#[source] std::io::Error),

    /// A per-step deadline elapsed.
    #[error("{stage} timed out")]
    Timeout { stage: &'static str },

    /// Writing to the client socket failed.
    #[error("client write failed: {0}")]
    ClientIo(#[source] std::io::Error),
}

impl ProxyError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        ProxyError::MalformedMessage(reason.into())
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MalformedMessage(_) => "malformed",
            ProxyError::UpstreamUnavailable { .. } => "upstream_unavailable",
            ProxyError::BadUpstreamResponse(_) => "bad_upstream_response",
            ProxyError::ClassificationFailure(_) => "classification_failure",
            ProxyError::RenderFailure(_) => "render_failure",
            ProxyError::AcceptorFault(_) => "acceptor_fault",
            ProxyError::Timeout { .. } => "timeout",
            ProxyError::ClientIo(_) => "client_io",
        }
    }
}
