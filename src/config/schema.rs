//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the filtering proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, worker pool).
    pub listener: ListenerConfig,

    /// Per-step I/O deadlines.
    pub timeouts: TimeoutConfig,

    /// Framing limits for buffered messages.
    pub limits: LimitsConfig,

    /// Host blacklist and content blocking policy.
    pub policy: PolicyConfig,

    /// Statistical classifier settings.
    pub classifier: ClassifierConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3128").
    pub bind_address: String,

    /// Size of the worker pool. Fixed for the lifetime of the dispatcher.
    pub workers: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3128".to_string(),
            workers: 64,
        }
    }
}

/// Timeout configuration for each blocking step of a cycle.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Reading the request from the client, in seconds.
    pub client_read_secs: u64,

    /// Establishing the upstream connection, in seconds.
    pub upstream_connect_secs: u64,

    /// Writing the request upstream and reading the response head, in seconds.
    /// Also bounds buffering a classifiable body, and each single read while
    /// relaying any other body.
    pub upstream_read_secs: u64,

    /// Writing the final response to the client, in seconds.
    pub client_write_secs: u64,

    /// Maximum lifetime of a CONNECT tunnel, in seconds.
    pub tunnel_secs: u64,

    /// How long shutdown waits for in-flight cycles, in seconds.
    pub drain_secs: u64,
}

impl TimeoutConfig {
    pub fn client_read(&self) -> Duration {
        Duration::from_secs(self.client_read_secs)
    }

    pub fn upstream_connect(&self) -> Duration {
        Duration::from_secs(self.upstream_connect_secs)
    }

    pub fn upstream_read(&self) -> Duration {
        Duration::from_secs(self.upstream_read_secs)
    }

    pub fn client_write(&self) -> Duration {
        Duration::from_secs(self.client_write_secs)
    }

    pub fn tunnel(&self) -> Duration {
        Duration::from_secs(self.tunnel_secs)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            client_read_secs: 10,
            upstream_connect_secs: 5,
            upstream_read_secs: 30,
            client_write_secs: 10,
            tunnel_secs: 120,
            drain_secs: 15,
        }
    }
}

/// Size limits applied while buffering messages.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of a start line plus headers.
    pub max_head_bytes: usize,

    /// Maximum size of a buffered body. Larger responses are relayed
    /// without classification.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_head_bytes: 64 * 1024,
            max_body_bytes: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Blocking policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// A category probability at or above this value blocks the page.
    pub block_threshold: f64,

    /// Media types whose bodies are classified (compared case-insensitively).
    pub classifiable_mime_types: Vec<String>,

    /// Blacklist file, one host per line. Watched for changes.
    pub blacklist_path: Option<String>,

    /// Replacement for the embedded "host blocked" page.
    pub blocked_page_path: Option<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            block_threshold: 0.8,
            classifiable_mime_types: vec!["text/html".to_string()],
            blacklist_path: None,
            blocked_page_path: None,
        }
    }
}

/// Classifier configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Trained naive Bayes model (JSON). Classification is disabled when unset.
    pub model_path: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin status surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the status endpoint.
    pub enabled: bool,

    /// Admin bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
