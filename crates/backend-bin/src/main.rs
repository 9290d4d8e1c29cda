use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use huddle_backend_lib::{config, ws_router, AppState};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "huddle-backend", about = "Room coordination server")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "huddle.toml")]
    config: PathBuf,

    /// Override the bind address from the config file
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = config::load_from(&cli.config)?;
    if let Some(bind) = cli.bind {
        settings.bind_addr = bind;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    let state = AppState::new(settings.clone());
    if settings.reaper.enabled {
        state.rooms.spawn_reaper(settings.reaper.clone());
    }

    let app = ws_router::create_router(state);
    let listener = TcpListener::bind(settings.bind_addr).await?;
    info!(addr = %settings.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
