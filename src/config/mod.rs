//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared by value / Arc with all subsystems
//!
//! Policy data (blacklist, classifier model):
//!     watcher.rs detects change
//!     → owner reloads the file
//!     → atomic swap of the Arc'd snapshot
//!     → next cycle observes the new snapshot
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::ProxyConfig;
pub use schema::ListenerConfig;
pub use schema::TimeoutConfig;
pub use schema::LimitsConfig;
pub use schema::PolicyConfig;
pub use schema::ObservabilityConfig;
pub use schema::ClassifierConfig;
pub use schema::AdminConfig;
