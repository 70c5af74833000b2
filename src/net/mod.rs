//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop backpressure, fixed worker pool)
//!     → connection.rs (ID, state machine, drain tracking)
//!     → Hand off to proxy::cycle
//!
//! Connection States:
//!     Accepted → RequestParsed → HostBlocked | Forwarded
//!              → ResponseReady → Written → Closed
//! ```
//!
//! # Design Decisions
//! - A worker permit is taken before accept, so a saturated pool stops accepting
//! - Each connection is tracked for graceful shutdown
//! - Plain TCP only; CONNECT tunnels are relayed opaquely

pub mod connection;
pub mod listener;
