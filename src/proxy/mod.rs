//! Proxy subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher.rs (accept loop, worker pool)
//!     → cycle.rs (one request/response cycle per connection)
//!         → policy gate: host check
//!         → upstream.rs (rewrite, connect, buffer response)
//!         → policy gate: content check
//!         → synthetic response or raw upstream bytes
//! ```

pub mod cycle;
pub mod dispatcher;
pub mod upstream;

use crate::config::{LimitsConfig, ProxyConfig, TimeoutConfig};
use crate::http::SyntheticResponses;
use crate::policy::PolicyGate;

pub use dispatcher::Dispatcher;
pub use upstream::Target;

/// Everything a cycle needs, shared read-only by all workers.
pub struct ProxyContext {
    pub gate: PolicyGate,
    pub responses: SyntheticResponses,
    pub timeouts: TimeoutConfig,
    pub limits: LimitsConfig,
}

impl ProxyContext {
    pub fn new(gate: PolicyGate, responses: SyntheticResponses, config: &ProxyConfig) -> Self {
        Self {
            gate,
            responses,
            timeouts: config.timeouts.clone(),
            limits: config.limits,
        }
    }
}

/// How a completed cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    HostBlocked,
    Forwarded,
    ContentBlocked,
    Tunneled,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::HostBlocked => "host_blocked",
            Outcome::Forwarded => "forwarded",
            Outcome::ContentBlocked => "content_blocked",
            Outcome::Tunneled => "tunneled",
        }
    }
}
