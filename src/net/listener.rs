//! TCP listener with a fixed-size worker pool.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Enforce the worker count via semaphore
//! - Tell transient accept errors apart from acceptor faults

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl ListenerError {
    /// Accept errors caused by a single peer; the loop keeps going.
    pub fn is_transient(&self) -> bool {
        match self {
            ListenerError::Accept(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            ListenerError::Bind(_) => false,
        }
    }
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A TCP listener that hands out at most `workers` connections at a time.
///
/// When every worker is busy, `accept` waits for one to finish before taking
/// the next connection off the socket.
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// One permit per worker.
    workers: Arc<Semaphore>,
    /// Configured pool size.
    pool_size: usize,
}

impl Listener {
    /// Bind to the configured address with the configured pool size.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(ListenerError::Bind)?;

        Self::from_listener(listener, config.workers)
    }

    /// Wrap an already bound socket.
    pub fn from_listener(listener: TcpListener, workers: usize) -> Result<Self, ListenerError> {
        let local_addr = listener
            .local_addr()
            .map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            workers,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            workers: Arc::new(Semaphore::new(workers)),
            pool_size: workers,
        })
    }

    /// Wait for a free worker, then accept a connection for it.
    ///
    /// The returned permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, WorkerPermit), ListenerError> {
        // Acquire permit first (backpressure). The semaphore is never closed.
        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ListenerError::Accept(std::io::Error::other(e)))?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            idle_workers = self.workers.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, WorkerPermit { _permit: permit }))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Workers not currently running a cycle.
    pub fn idle_workers(&self) -> usize {
        self.workers.available_permits()
    }

    /// Configured pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

/// A worker slot held by one connection.
///
/// Dropping it returns the worker to the pool, including when the cycle panics.
#[derive(Debug)]
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
}
