//! Media Bot
//!
//! Single-binary service that:
//! 1. Starts a bounded pool of proxy-bound page loaders
//! 2. Accepts chat messages over HTTP, one URL per line
//! 3. Checks each account's quota, extracts and downloads the media behind
//!    each URL, reporting progress as status messages
//! 4. Delivers the media in size-bounded groups to the output directory

mod api;
mod config;
mod error;
mod messenger;
mod metrics;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use browser_pool::{HttpBrowser, HttpBrowserFactory, ResourcePool};
use media_adapter::{AdapterRegistry, DirectAdapter, PageMetaAdapter};
use media_pipeline::Processor;
use quota::{FileQuotaStore, QuotaGuard};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::{AppState, build_router};
use crate::config::Config;
use crate::messenger::FsMessenger;

/// How long in-flight HTTP handlers may take to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long URL tasks may take to deliver or report failure once the pool is closed.
const URL_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filter from LOG_LEVEL, then RUST_LOG, then "info"
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting media-bot");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus = metrics::install_recorder()?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        pool_size = config.pool.size,
        proxies = config.pool.proxy_list.len(),
        retry_attempts = config.pipeline.retry_attempts,
        output_dir = %config.delivery.output_dir.display(),
        "configuration loaded"
    );

    let store = FileQuotaStore::load(config.quota.state_file.clone(), config.quota.plans.clone())
        .await
        .map_err(error::Error::from)
        .with_context(|| format!("quota state file {}", config.quota.state_file.display()))?;
    let quota = QuotaGuard::new(Arc::new(store), config.quota.default_plan.clone());

    let adapters = build_adapters(&config);
    info!(adapters = ?adapters.names(), "adapters registered");

    let factory = HttpBrowserFactory::new(config.page_timeout());
    let pool = ResourcePool::new(config.pool_config(), &factory)
        .await
        .map_err(error::Error::from)?;
    let pool = Arc::new(pool);

    let messenger = Arc::new(FsMessenger::new(config.delivery.output_dir.clone()));
    let processor = match Processor::new(
        pool.clone(),
        Arc::new(adapters),
        Arc::new(quota),
        messenger,
        config.pipeline_config(),
    ) {
        Ok(processor) => Arc::new(processor),
        Err(e) => {
            close_pool(&pool).await;
            return Err(error::Error::from(e).into());
        }
    };

    let app = build_router(
        AppState {
            processor: processor.clone(),
            prometheus,
            started_at: Instant::now(),
        },
        config.server.max_connections,
    );

    let listen_addr = config.server.listen_addr;
    let listener = match TcpListener::bind(listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            close_pool(&pool).await;
            return Err(e).with_context(|| format!("failed to bind to {listen_addr}"));
        }
    };
    info!(addr = %listen_addr, "accepting messages");

    // The drain timeout starts at signal receipt, not at server start.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    // Closing the pool cancels extractions still running in URL tasks; each
    // task then reports its terminal status before the drain completes.
    close_pool(&pool).await;
    if !processor.drain(URL_DRAIN_TIMEOUT).await {
        warn!(
            drain_timeout_secs = URL_DRAIN_TIMEOUT.as_secs(),
            "url tasks did not finish before shutdown"
        );
    }

    info!("shutdown complete");
    Ok(())
}

/// Registration order is match order: direct media links before the
/// catch-all page adapter.
fn build_adapters(config: &Config) -> AdapterRegistry<HttpBrowser> {
    let mut registry =
        AdapterRegistry::with_defaults(&config.adapters.quality, config.adapter_timeout());
    registry.register(DirectAdapter::new());
    if config.adapters.page_hosts.is_empty() {
        registry.register(PageMetaAdapter::new());
    } else {
        registry.register(PageMetaAdapter::for_hosts(config.adapters.page_hosts.iter().cloned()));
    }
    registry
}

async fn close_pool(pool: &ResourcePool<HttpBrowser>) {
    match pool.close().await {
        Ok(()) => info!("resource pool closed"),
        Err(e) => error!(error = %e, "errors while closing resource pool"),
    }
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
