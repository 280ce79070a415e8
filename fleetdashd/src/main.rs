//! fleetdash daemon
//!
//! Serves the operations dashboard API: reconciled repository state from
//! reporter events, sandboxed commit lookups, worker health and control,
//! and client bookkeeping in Postgres.

#![forbid(unsafe_code)]

mod clients;
mod config;
mod control;
mod errors;
mod git;
mod health;
mod host_metrics;
mod http_api;
mod repo_state;
mod resolver;
mod runner;
mod store;

use anyhow::{Context, Result};
use clap::Parser;
use fleetdash_common::mask_url_password;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::DaemonConfig;
use control::{CONTROL_TIMEOUT, ControlProxy};
use git::{GitInspector, RepoSandbox};
use health::WorkerProber;
use host_metrics::HostMetricsCollector;
use http_api::HttpState;
use runner::{CommandRunner, SystemRunner};
use store::PgStore;

#[derive(Parser)]
#[command(name = "fleetdashd")]
#[command(author, version, about = "fleetdash daemon - operations dashboard API")]
struct Cli {
    /// Address to listen on (overrides FLEETDASH_BIND)
    #[arg(short, long)]
    bind: Option<String>,

    /// Path to worker roster TOML (overrides FLEETDASH_WORKERS_CONFIG)
    #[arg(short, long)]
    workers_config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_logging(cli: &Cli, level: &str) {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match DaemonConfig::load() {
        Ok(config) => config,
        Err(errors) => {
            for e in &errors {
                eprintln!("fleetdashd: {e}");
            }
            anyhow::bail!("{} invalid environment variable(s)", errors.len());
        }
    };
    config.bind = config.bind.or_cli(cli.bind.clone());
    config.workers_config = config
        .workers_config
        .or_cli(cli.workers_config.clone().map(Some));

    init_logging(&cli, &config.log_level.value);
    info!("Starting fleetdash daemon v{}", env!("CARGO_PKG_VERSION"));
    config.log_summary();

    let roster = config::load_workers(
        config.workers_config.value.as_deref(),
        &config.remote_base_url.value,
    )?;
    for worker in &roster {
        info!(id = %worker.id, url = %worker.health_url, "Worker registered");
    }

    info!(
        url = %mask_url_password(&config.database_url.value),
        "Connecting to PostgreSQL"
    );
    let store = PgStore::connect(&config.database_url.value, config.db_max_connections.value)
        .await
        .with_context(|| {
            format!(
                "failed to connect to {}",
                mask_url_password(&config.database_url.value)
            )
        })?;

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let state = HttpState {
        store: Arc::new(store.clone()),
        sandbox: RepoSandbox::new(config.repo_roots()),
        inspector: GitInspector::new(runner.clone()),
        prober: WorkerProber::new(config.probe_timeout.value),
        control: ControlProxy::new(config.control_url.value.clone(), CONTROL_TIMEOUT),
        roster,
        metrics: HostMetricsCollector::new(runner),
        version: env!("CARGO_PKG_VERSION"),
        started_at: Instant::now(),
        pid: std::process::id(),
    };

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    let served = axum::serve(listener, http_api::create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = &served {
        warn!("HTTP server stopped with error: {}", e);
    }

    store.close().await;
    info!("Daemon stopped");
    served.map_err(Into::into)
}
