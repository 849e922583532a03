mod client;
mod config;
mod error;
mod model;
mod routes;
mod state;
mod utils {
    pub mod jwt;
}

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{ClientConfig, ServerConfig};
use error::AppResult;

#[derive(Parser)]
#[command(name = "counter_room", about = "Shared room counter over room metadata")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Room backend: /create-room, /counter-increment and the /rtc room hub.
    Server(ServerConfig),
    /// Join a fresh room and drive the counter from the terminal.
    Client {
        /// Folder (page route id) shown in the log.
        #[arg(long, default_value = "inbox")]
        folder: String,
        #[command(flatten)]
        cfg: ClientConfig,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    match Cli::parse().cmd {
        Cmd::Server(cfg)            => serve(cfg).await?,
        Cmd::Client { folder, cfg } => client::run(cfg, folder).await?,
    }
    Ok(())
}

async fn serve(cfg: ServerConfig) -> AppResult<()> {
    let listener = tokio::net::TcpListener::bind(&cfg.bind).await?;
    info!(addr = %cfg.bind, "backend listening");
    axum::serve(listener, routes::app(cfg).into_make_service()).await?;
    Ok(())
}
