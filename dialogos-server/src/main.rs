//! Dialogos server - HTTP/SSE surface for the session engine

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dialogos_core::prelude::*;

mod routes;

use routes::AppState;

#[derive(Parser)]
#[command(name = "dialogos")]
#[command(about = "Dialogos session engine server", long_about = None)]
#[command(version)]
struct Cli {
    /// Listen address
    #[arg(short, long, default_value = "127.0.0.1:8080", env = "DIALOGOS_LISTEN")]
    listen: SocketAddr,

    /// Configuration file path (defaults to dialogos.toml + DIALOGOS_* env)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::load()?,
    };

    let state = Arc::new(AppState::new(config)?);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    tracing::info!(addr = %cli.listen, version = dialogos_core::VERSION, "dialogos server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
