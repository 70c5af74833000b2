//! Admin status surface.
//!
//! Exposes a single read-only query: whether the proxy is accepting
//! connections.

pub mod handlers;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use self::handlers::get_status;
use crate::lifecycle::{ShutdownSignal, StatusHandle};

pub fn setup_admin_router(status: StatusHandle) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(status)
}

/// Serve the admin router until `shutdown` fires.
pub async fn serve_admin(listener: TcpListener, status: StatusHandle, mut shutdown: ShutdownSignal) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin server listening");

    axum::serve(listener, setup_admin_router(status))
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await?;

    tracing::info!("Admin server stopped");
    Ok(())
}
