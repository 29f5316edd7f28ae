// crates/server/src/main.rs
//! codescan server binary.
//!
//! Loads the YAML config, opens the task database and serves the API until
//! Ctrl-C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use codescan_core::Config;
use codescan_db::SqliteTaskSink;
use codescan_server::{create_app, init_metrics, AppState};

#[derive(Parser)]
#[command(name = "codescan")]
#[command(about = "Clone repositories, build CodeQL databases and analyze them in the background")]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    codescan_observability::init_tracing(&config.logging)
        .context("installing tracing subscriber")?;
    init_metrics();

    let sink = SqliteTaskSink::new(&config.database.path)
        .await
        .with_context(|| format!("opening task database {}", config.database.path.display()))?;

    let addr = config.listen_addr()?;
    let state = AppState::from_config(config, Arc::new(sink));
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, version = env!("CARGO_PKG_VERSION"), "codescan listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
