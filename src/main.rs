//! Content filtering HTTP proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────┐
//!                       │                 CONTENT FILTER PROXY                 │
//!                       │                                                      │
//!   Client request      │  ┌────────────┐   ┌──────────┐   ┌───────────────┐   │
//!   ────────────────────┼─▶│ dispatcher │──▶│  cycle   │──▶│ policy gate   │   │
//!                       │  │ + workers  │   │ (codec)  │   │ host check    │   │
//!                       │  └────────────┘   └──────────┘   └──────┬────────┘   │
//!                       │                                         │ allowed    │
//!                       │                                         ▼            │
//!                       │                                  ┌───────────────┐   │
//!                       │                                  │   upstream    │◀──┼──── Origin
//!                       │                                  └──────┬────────┘   │     server
//!                       │                                         │            │
//!                       │                                         ▼            │
//!   Client response     │  ┌────────────┐                  ┌───────────────┐   │
//!   ◀───────────────────┼──│ synthetic  │◀── blocked ──────│ content check │   │
//!                       │  │ or raw     │                  │ (classifier)  │   │
//!                       │  └────────────┘                  └───────────────┘   │
//!                       │                                                      │
//!                       │  config · observability · lifecycle · admin /status  │
//!                       └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use content_filter_proxy::admin::serve_admin;
use content_filter_proxy::config::loader::load_config;
use content_filter_proxy::config::ProxyConfig;
use content_filter_proxy::lifecycle::startup::{build_components, start_watchers};
use content_filter_proxy::lifecycle::{signals, ProxyState, Shutdown};
use content_filter_proxy::observability::{logging, metrics};
use content_filter_proxy::proxy::Dispatcher;

#[derive(Parser)]
#[command(name = "content-filter-proxy")]
#[command(about = "Intercepting HTTP proxy with host blacklisting and content classification", long_about = None)]
struct Args {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "content-filter-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        workers = config.listener.workers,
        block_threshold = config.policy.block_threshold,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let components = build_components(&config)?;
    let _watchers = start_watchers(&config, &components)?;

    let shutdown = Shutdown::new();
    let state = ProxyState::new();

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let status = state.status_handle();
        let signal = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = serve_admin(listener, status, signal).await {
                tracing::error!(error = %e, "Admin server failed");
            }
        });
    }

    let dispatcher = Dispatcher::new(components.context.clone(), &config, state.clone());
    let listener = dispatcher.bind().await?;
    let mut proxy = tokio::spawn(dispatcher.run(listener, shutdown.subscribe()));

    let dispatcher_done = tokio::select! {
        _ = signals::shutdown_on_ctrl_c(&shutdown) => false,
        result = &mut proxy => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Dispatcher task failed");
            }
            true
        }
    };

    shutdown.trigger();
    if !dispatcher_done {
        if let Err(e) = proxy.await {
            tracing::error!(error = %e, "Dispatcher task failed");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
