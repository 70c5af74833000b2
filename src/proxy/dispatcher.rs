//! Connection dispatcher.
//!
//! # Responsibilities
//! - Own the listening socket and the fixed worker pool
//! - Hand every accepted connection to exactly one worker
//! - Keep the lifecycle flag in step with the socket
//! - Drain in-flight cycles on shutdown
//!
//! # Design Decisions
//! - A worker permit is taken before `accept`, so a saturated pool leaves new
//!   connections in the kernel backlog
//! - Transient accept errors are logged and skipped; anything else ends the loop
//! - The loop never returns an error to its caller

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ListenerConfig, ProxyConfig};
use crate::error::ProxyError;
use crate::lifecycle::{ProxyState, ShutdownSignal};
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::proxy::{cycle, ProxyContext};

/// Accept loop plus worker pool.
pub struct Dispatcher {
    context: Arc<ProxyContext>,
    listener_config: ListenerConfig,
    drain: Duration,
    state: ProxyState,
    tracker: ConnectionTracker,
}

impl Dispatcher {
    pub fn new(context: Arc<ProxyContext>, config: &ProxyConfig, state: ProxyState) -> Self {
        Self {
            context,
            listener_config: config.listener.clone(),
            drain: config.timeouts.drain(),
            state,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Bind the listening socket. A failed bind leaves the proxy not running.
    pub async fn bind(&self) -> Result<Listener, ListenerError> {
        match Listener::bind(&self.listener_config).await {
            Ok(listener) => Ok(listener),
            Err(e) => {
                tracing::error!(
                    address = %self.listener_config.bind_address,
                    error = %e,
                    "Failed to bind proxy listener"
                );
                self.state.mark_stopped();
                Err(e)
            }
        }
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Accept until `shutdown` fires or the socket fails, then drain.
    pub async fn run(self, listener: Listener, mut shutdown: ShutdownSignal) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, workers = listener.pool_size(), "Proxy accepting connections");
        }
        self.state.mark_running();

        let fault = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested, closing listener");
                    break None;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let guard = self.tracker.track();
                        let context = Arc::clone(&self.context);
                        tokio::spawn(async move {
                            let _permit = permit;
                            cycle::serve_connection(context, stream, peer, guard.id()).await;
                            drop(guard);
                        });
                    }
                    Err(e) if e.is_transient() => {
                        tracing::warn!(error = %e, "Transient accept error");
                    }
                    Err(ListenerError::Accept(e) | ListenerError::Bind(e)) => {
                        break Some(ProxyError::AcceptorFault(e))
                    }
                }
            }
        };

        drop(listener);
        self.state.mark_stopped();
        if let Some(e) = fault {
            tracing::error!(error = %e, "Accept loop stopped");
        }

        let in_flight = self.tracker.active_count();
        if in_flight > 0 {
            tracing::info!(in_flight, "Draining connections");
        }
        if !self.tracker.wait_for_drain(self.drain).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain deadline passed with cycles still running"
            );
        }
    }
}
