//! rivulet-server: serves the demonstration streams over HTTP/1.1.
//!
//! # Usage
//!
//! ```text
//! rivulet-server --config rivulet.toml --bind 0.0.0.0:8080
//! ```
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rivulet::core::WorkerPool;
use rivulet::{Server, ServerConfig, Service};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,rivulet=debug,rivulet_core=debug";

#[derive(Parser, Debug)]
#[command(name = "rivulet-server", about = "Incremental response streaming server", version)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Address to listen on, overrides `server.bind`.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Directory of the file served by `/file-stream`, overrides `streams.static_dir`.
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(static_dir) = cli.static_dir {
        config.streams.static_dir = static_dir;
    }

    let pool = WorkerPool::new(config.pool.to_pool_config());
    let service = Service::new(config.streams.clone(), pool);
    let server = Server::bind(config.server.bind).await?;
    info!(
        addr = %server.local_addr()?,
        file = %config.streams.file_path().display(),
        "rivulet server starting"
    );

    server
        .serve_with_graceful_shutdown(
            service,
            shutdown_signal(),
            Some(config.server.shutdown_timeout()),
        )
        .await
        .context("server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("ctrl-c received"),
        Err(e) => {
            tracing::error!(error = ?e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}
