//! Policy subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed request:
//!     → gate.rs check_host (blacklist.rs snapshot)
//!     → BlockHost: synthetic page, no upstream connection
//!
//! Upstream response:
//!     → gate.rs check_content (classifiable media types only)
//!     → classifier adapter → threshold → Allow | BlockContent
//! ```
//!
//! # Design Decisions
//! - Cheap host check first so blocked hosts never cost a round trip
//! - Content decisions fail open when the classifier fails
//! - Threshold and media types come from configuration

pub mod blacklist;
pub mod gate;

pub use blacklist::{Blacklist, SharedBlacklist};
pub use gate::{PolicyGate, PolicyVerdict};
