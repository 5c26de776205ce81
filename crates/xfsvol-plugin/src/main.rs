//! xfsvol plugin daemon.
//!
//! Serves the Docker volume plugin API on a Unix socket, creating each
//! volume as a directory under an XFS mount with its own project quota.
//!
//! Usage:
//!   xfsvol-plugin --host-mountpoint /mnt/xfs/volumes --default-size 512M
//!
//! Every flag can also be set from the environment (`HOST_MOUNTPOINT`,
//! `DEFAULT_SIZE`, `XFSVOL_SOCKET`, `STARTING_PROJECT_ID`, `DEBUG`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use xfsvol_plugin::constants::{DEFAULT_HOST_MOUNTPOINT, DEFAULT_SIZE, DEFAULT_SOCKET_ADDRESS};
use xfsvol_plugin::server::{self, SocketGuard};
use xfsvol_plugin::{Driver, DriverConfig};

/// Docker volume plugin backed by XFS project quotas.
#[derive(Parser, Debug)]
#[command(name = "xfsvol-plugin", version)]
#[command(about = "Docker volume plugin backed by XFS project quotas")]
struct Args {
    /// XFS-mounted directory (pquota) volumes are created in
    #[arg(long, env = "HOST_MOUNTPOINT", default_value = DEFAULT_HOST_MOUNTPOINT)]
    host_mountpoint: PathBuf,

    /// Size of volumes created without a `size` option
    #[arg(long, env = "DEFAULT_SIZE", default_value = DEFAULT_SIZE)]
    default_size: String,

    /// Unix socket to serve the plugin API on
    #[arg(long, env = "XFSVOL_SOCKET", default_value = DEFAULT_SOCKET_ADDRESS)]
    socket: PathBuf,

    /// Lowest project id handed out to new volumes
    #[arg(long, env = "STARTING_PROJECT_ID")]
    starting_project_id: Option<u32>,

    /// Enable debug logging
    #[arg(long, env = "DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    tracing::debug!(?args, "starting plugin");

    let driver = Driver::new(DriverConfig {
        host_mountpoint: args.host_mountpoint,
        default_size: args.default_size,
        starting_project_id: args.starting_project_id,
    })
    .context("couldn't initialize driver")?;

    let listener = server::bind(&args.socket)
        .with_context(|| format!("couldn't listen on {}", args.socket.display()))?;
    let _guard = SocketGuard::new(&args.socket);

    tracing::info!(socket = %args.socket.display(), "plugin listening");
    server::serve(listener, Arc::new(driver), shutdown_signal())
        .await
        .context("plugin server failed")
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "couldn't listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "couldn't listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
