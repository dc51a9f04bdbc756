mod color;
mod config;
mod debounce;
mod downloader;
mod engine;
mod enumerator;
mod event;
mod filters;
mod history;
mod ipc_server;
mod macros;
mod origin;
mod preparer;
mod sampler;
mod scheduler;
mod sources;
mod store;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::color::HistogramExtractor;
use crate::config::Config;
use crate::engine::Engine;

/// Background wallpaper rotation daemon
#[derive(Parser, Debug)]
#[command(name = "rota")]
#[command(version, about)]
struct Args {
    /// Configuration file (defaults to ~/.config/rota/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// `RUST_LOG` wins over the configured level
fn logger(level: &str) -> env_logger::Builder {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_config_path()?,
    };
    // The log level comes from the config, so load it before the logger exists
    let (config, load_error) = match Config::load_from_path(&config_path) {
        Ok(cfg) => (cfg, None),
        Err(e) => (Config::default(), Some(e)),
    };

    logger(&config.general.log_level).init();

    log::info!("Starting Rota v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Looking for config at: {}", config_path.display());
    match load_error {
        None => log::info!("Configuration loaded successfully"),
        Some(e) => log::warn!("Failed to load config: {:#}. Using defaults.", e),
    }

    let store = store::from_config(&config);
    let engine = Engine::new(
        config,
        Some(config_path),
        store,
        Box::new(HistogramExtractor),
    );
    let tasks = engine.start();

    let ipc_engine = engine.clone();
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server::start(ipc_engine.clone()).await {
            log::error!("IPC server error: {}", e);
            ipc_engine.shutdown();
        }
    });

    // Set up signal handlers
    let signal_engine = engine.clone();
    let signal_handle = tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                log::error!("Failed to set up signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM, shutting down...");
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT, shutting down...");
            }
        }

        signal_engine.shutdown();
    });

    // The IPC server returns once the engine stops running
    if let Err(e) = ipc_handle.await {
        log::error!("IPC server task failed: {}", e);
    }
    signal_handle.abort();

    // Background tasks exit on their next wake-up; an in-flight refill or
    // download may take longer
    for task in tasks {
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            log::warn!("Background task did not stop in time");
        }
    }

    log::info!("Daemon shutting down");
    Ok(())
}
