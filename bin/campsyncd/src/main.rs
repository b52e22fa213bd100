//! `campsyncd`: HTTP trigger service for the sync pipeline.
//!
//! Deployments that schedule stages externally (cron, workflow engines)
//! poke this service instead of shelling into the container. It exposes
//! the two stages over a small JSON API and runs them one at a time.

mod routes;

use clap::Parser;
use tracing::info;

/// CampSync trigger service.
#[derive(Parser, Debug)]
#[command(name = "campsyncd", about = "CampSync HTTP trigger service")]
struct Cli {
    /// Listen address.
    #[arg(long = "listen", default_value = "0.0.0.0:8181")]
    listen: String,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if cli.debug { "debug".into() } else { "info".into() }
            }),
        )
        .init();

    let app = routes::build_router(routes::AppState::new());

    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    info!(listen = %cli.listen, "campsyncd listening");
    axum::serve(listener, app).await?;
    Ok(())
}
