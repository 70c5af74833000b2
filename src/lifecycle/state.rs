//! Whether the dispatcher is accepting connections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide running flag, written by the dispatcher only.
#[derive(Debug, Clone, Default)]
pub struct ProxyState {
    running: Arc<AtomicBool>,
}

impl ProxyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_running(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            tracing::info!("Proxy is running");
        }
    }

    pub(crate) fn mark_stopped(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Proxy stopped");
        }
    }

    /// Read-only view for the status surface.
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            running: Arc::clone(&self.running),
        }
    }
}

/// Read-only handle onto [`ProxyState`].
#[derive(Debug, Clone)]
pub struct StatusHandle {
    running: Arc<AtomicBool>,
}

impl StatusHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
