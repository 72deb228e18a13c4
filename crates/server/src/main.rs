use cadforge_core::{CADFORGE_LOG_VAR, CADFORGE_ROOT_VAR, DEFAULT_PORT};
use cadforge_server::AppState;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cadforge-server")]
#[command(about = "Backend for the cadforge CAD analysis dashboard", long_about = None)]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Automation root holding scripts/, configs/, and output/
    /// (falls back to $CADFORGE_ROOT)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Cache budget in bytes
    #[arg(long)]
    cache_budget: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(CADFORGE_LOG_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let root = cli
        .root
        .or_else(|| std::env::var(CADFORGE_ROOT_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("freecad-automation"));

    let state = AppState::new(&root, cli.cache_budget);
    let app = cadforge_server::router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.port)).await?;
    tracing::info!(
        root = %root.display(),
        "cadforge backend running on http://localhost:{}",
        cli.port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
