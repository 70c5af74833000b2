//! Intercepting HTTP proxy with host blacklisting and content classification.

pub mod admin;
pub mod classifier;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod policy;
pub mod proxy;
pub mod render;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use lifecycle::{ProxyState, Shutdown};
pub use policy::{PolicyGate, PolicyVerdict};
pub use proxy::{Dispatcher, ProxyContext};
