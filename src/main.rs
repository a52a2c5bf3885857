mod ai;
mod app;
mod cli;
mod config;
mod db;
mod digest;
mod error;
mod feed;
mod message;
mod models;
mod services;
mod store;
mod webhook;

use std::process::ExitCode;

use tracing::Level;
use tracing_subscriber::EnvFilter;

use app::App;
use cli::{Args, Command};
use config::{Config, FeedList};
use digest::{DigestOutcome, WeeklyDigest};
use error::Result;
use webhook::Server;

fn set_up_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    set_up_logging();

    match start().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn start() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load()?;
    if let Some(path) = args.feeds_path {
        config.feeds_path = path;
    }

    match args.command {
        Command::Run => {
            let feeds = FeedList::load(&config.feeds_path)?.feeds;
            tracing::info!("Loaded {} feeds from {}", feeds.len(), config.feeds_path.display());
            let app = App::new(&config, feeds).await?;
            app.run().await;
        }
        Command::Digest => match WeeklyDigest::new(&config)?.send().await? {
            DigestOutcome::Sent(count) => tracing::info!("Weekly digest covered {} articles", count),
            DigestOutcome::Deferred => tracing::warn!("Weekly digest not sent, will retry next time"),
            DigestOutcome::NothingToSend => {}
        },
        Command::Serve => {
            config.require_webhook()?;
            let store = store::open(&config).await?;
            let server = Server::new(&config, store).await?;
            tracing::info!("Webhook listening on {}", server.local_addr()?);
            server.serve().await?;
        }
    }

    Ok(())
}
