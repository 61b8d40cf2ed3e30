//! Read Aloud - documents read aloud with word-level highlighting.
//!
//! The `serve` subcommand runs the chunked synthesis pipeline: transcripts are
//! split into fixed-size chunks, synthesized by a bounded pool of external
//! processes and streamed in order over a websocket. The `read` subcommand is a
//! terminal client that plays those chunks back and highlights the current word.

mod audio;
mod client;
mod config;
mod error;
mod server;
mod text;
mod tts;

use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use config::{Cli, Command};

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn wait_for_shutdown(shutdown: CancellationToken) {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, shutting down...");
        }
        _ = shutdown.cancelled() => return,
    }

    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Time-only timestamps; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("📚 Read Aloud v{}", env!("CARGO_PKG_VERSION"));

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(shutdown.clone()));

    let result = match cli.command {
        Command::Serve(config) => {
            if let Err(e) = config.validate() {
                error!("❌ Configuration error: {}", e);
                std::process::exit(1);
            }
            config.log_config();
            server::run(config, shutdown.clone()).await
        }
        Command::Read(config) => {
            if let Err(e) = config.validate() {
                error!("❌ Configuration error: {}", e);
                std::process::exit(1);
            }
            config.log_config();
            client::run(config, shutdown.clone()).await
        }
    };

    shutdown.cancel();

    if let Err(e) = &result {
        error!("❌ {:#}", e);
    }
    info!("👋 Goodbye!");
    result
}
