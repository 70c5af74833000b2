//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Every blocking step of a cycle:
//!     → timeouts.rs (client read, upstream connect, upstream exchange, client write, tunnel)
//!     → On expiry: ProxyError::Timeout { stage }
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries: a single upstream attempt per cycle

pub mod timeouts;

pub use timeouts::with_deadline;
