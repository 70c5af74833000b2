//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap every blocking step of a cycle with a deadline
//! - Cancel the wrapped operation cleanly when it fires
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors and name the stage
//! - Timed-out upstream exchanges return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

use crate::error::ProxyError;

/// Run `fut` with a deadline, mapping expiry to [`ProxyError::Timeout`].
pub async fn with_deadline<F, T>(stage: &'static str, limit: Duration, fut: F) -> Result<T, ProxyError>
where
    F: Future<Output = Result<T, ProxyError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(stage, limit_ms = limit.as_millis() as u64, "Deadline exceeded");
            Err(ProxyError::Timeout { stage })
        }
    }
}
