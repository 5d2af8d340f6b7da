use anyhow::{Context, Result};
use clap::Parser;
use muster::local::CommandRunner;
use muster::guard::FsInspector;
use muster::remote::SshChannel;
use muster::rig::Rig;
use muster::store::{FileStore, RigStore};
use muster::web::{self, WebState};
use muster::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// The Muster recording rig server
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a config file. Overrides the usual discovery locations.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on. Overrides the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Root directory for recorded data. Overrides the config file.
    #[arg(long)]
    data_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = musterconf::MusterConfig::load_with_override(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        config.bind.http_port = port;
    }
    if let Some(data_root) = cli.data_root {
        config.data_root = data_root;
    }

    // RUST_LOG wins over the config file.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    std::fs::create_dir_all(&config.data_root).context("Failed to create data root")?;
    tracing::info!("Data root: {}", config.data_root.display());

    let registry = Arc::new(Registry::from_config(&config));
    tracing::info!(
        cameras = registry.cameras().count(),
        controllers = registry.controllers().count(),
        "Device registry loaded"
    );

    let store_path = config.data_root.join("muster-state.json");
    let store = Arc::new(
        FileStore::open(store_path.clone()).context("Failed to open state store")?,
    );
    tracing::info!("State store at: {}", store_path.display());

    let rig = Arc::new(
        Rig::new(
            registry,
            config.data_root.clone(),
            store.clone(),
            Arc::new(SshChannel),
            Duration::from_secs(config.remote.timeout_secs),
            Arc::new(CommandRunner::new()),
            Arc::new(FsInspector),
        )
        .context("Failed to initialize rig")?,
    );

    let server_start = Instant::now();
    let app = web::router(WebState {
        rig: rig.clone(),
        started_at: server_start,
    });

    let addr = format!("0.0.0.0:{}", config.bind.http_port);
    let bind_addr: std::net::SocketAddr = addr.parse().context("Failed to parse bind address")?;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!("Muster server starting on http://{}", addr);
    tracing::info!("   State: GET http://{}/state", addr);
    tracing::info!("   Devices: GET http://{}/devices", addr);
    tracing::info!("   Action log: GET http://{}/log", addr);
    tracing::info!("   Health: GET http://{}/health", addr);

    let shutdown_token = CancellationToken::new();

    let shutdown_token_srv = shutdown_token.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_token_srv.cancelled().await;
        tracing::info!("Server shutdown signal received");
    });

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!("Server shutdown with error: {:?}", e);
        }
    });

    // Periodic statistics logging
    let stats_rig = rig.clone();
    let stats_ct = shutdown_token.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let stats = stats_rig.tracker_stats();
                    tracing::info!(
                        processes.starting = stats.reserved,
                        processes.running = stats.running,
                        session.active = stats_rig.active_session().is_some(),
                        "Server statistics"
                    );
                }
                _ = stats_ct.cancelled() => {
                    break;
                }
            }
        }
    });

    // Handle both SIGINT (Ctrl+C) and SIGTERM (systemd etc.)
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
            shutdown_token.cancel();
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
            shutdown_token.cancel();
        }
    }

    let _ = server_handle.await;
    store.flush().context("Failed to flush state store")?;
    tracing::info!("Shutdown complete");

    Ok(())
}
