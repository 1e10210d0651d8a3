//! dockdns daemon entry point.

use std::sync::Arc;

use anyhow::Context;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

mod config;
mod dns_server;
mod error;
mod mapper;
mod registry;
mod runtime;
mod sync;
mod types;

use config::Config;
use dns_server::{run_dns_server, RegistryHandler};
use mapper::NamingPolicy;
use registry::Registry;
use runtime::DockerRuntime;
use sync::Synchronizer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration before logging so its level can seed the filter.
    let cfg = Config::load();
    let level = cfg
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".into());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    let cfg = cfg?;
    info!("Starting dockdns with config: {:?}", cfg);
    for warning in cfg.warnings() {
        warn!("{}", warning);
    }

    let registry = Registry::new();

    // Container Runtime (Docker)
    let runtime = Arc::new(DockerRuntime::connect().context("Failed to connect to Docker")?);
    let synchronizer = Arc::new(Synchronizer::new(
        runtime,
        registry.clone(),
        NamingPolicy::from_config(&cfg),
        cfg.reconnect_delay(),
    ));
    // Subscribe before listing so nothing that happens during the listing is lost.
    let events = synchronizer.subscribe().await;
    synchronizer.bootstrap().await?;

    let shutdown = CancellationToken::new();

    let sync_handle = {
        let synchronizer = Arc::clone(&synchronizer);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { synchronizer.run(events, shutdown).await })
    };

    // DNS Server
    let handler = RegistryHandler::new(&cfg.zone, registry.clone(), cfg.ttl)?;
    let mut dns_handle = tokio::spawn(run_dns_server(cfg.dns_bind, handler, shutdown.clone()));

    // Graceful Shutdown
    let dns_result = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut dns_handle => Some(result),
    };
    shutdown.cancel();

    let dns_result = match dns_result {
        Some(result) => result,
        None => dns_handle.await,
    };
    if let Err(e) = sync_handle.await {
        error!("Synchronizer task failed: {}", e);
    }

    match dns_result {
        Ok(Ok(())) => {
            info!("Shutdown complete.");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("DNS server failed: {:#}", e);
            Err(e)
        }
        Err(e) => Err(anyhow::anyhow!("DNS server task failed: {}", e)),
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, shutting down...");
            }
            Err(err) => {
                error!("Unable to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
