//! MintFeed: watch program logs for new token pools and push every new
//! token, with its metadata and social links, to WebSocket consumers.
//!
//! # Commands
//! ```text
//! mintfeed run          [--config FILE] [--http-url URL] [--ws-url URL] [--das-url URL]
//!                       [--bind ADDR] [--json-logs]
//! mintfeed check-config [--config FILE]
//! mintfeed version
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use mintfeed_stream::Engine;

mod config;
mod logging;

use config::{AppConfig, Overrides};

#[derive(Parser)]
#[command(
    name = "mintfeed",
    about = "Stream newly minted tokens to WebSocket consumers",
    long_about = "
MintFeed subscribes to program logs on a Solana RPC node, resolves every
pool-creation transaction, enriches the new token with its metadata and
broadcasts it to all connected WebSocket consumers. Late joiners receive the
most recent events first.

ENVIRONMENT VARIABLES:
  RUST_LOG    Log filter, overrides the `log` section of the config
",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion pipeline and the broadcast endpoint
    Run {
        /// YAML config file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// JSON-RPC HTTP endpoint
        #[arg(long)]
        http_url: Option<String>,
        /// JSON-RPC WebSocket endpoint
        #[arg(long)]
        ws_url: Option<String>,
        /// Endpoint serving DAS `getAsset` for token metadata
        #[arg(long)]
        das_url: Option<String>,
        /// Listen address for consumers, e.g. 0.0.0.0:8080
        #[arg(long)]
        bind: Option<String>,
        /// Emit JSON structured logs
        #[arg(long)]
        json_logs: bool,
    },

    /// Validate a config file and print the effective configuration
    #[command(name = "check-config")]
    CheckConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print version
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            http_url,
            ws_url,
            das_url,
            bind,
            json_logs,
        } => {
            let overrides = Overrides {
                http_url,
                ws_url,
                das_url,
                bind,
                json_logs,
            };
            cmd_run(config, overrides).await
        }
        Commands::CheckConfig { config } => cmd_check_config(config),
        Commands::Version => {
            println!("mintfeed {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn cmd_run(path: Option<PathBuf>, overrides: Overrides) -> Result<()> {
    let config = AppConfig::load(path.as_deref())?.apply(overrides);
    logging::init_tracing(&config.log);

    let engine = Engine::connect(config.stream)
        .await
        .context("failed to start pipeline")?;
    let server = engine.bind().await.context("failed to open consumer endpoint")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Keep the sender alive: a dropped sender reads as a shutdown request.
            tracing::error!(error = %e, "cannot listen for interrupt");
            std::future::pending::<()>().await;
        }
        tracing::info!("interrupt received");
        let _ = shutdown_tx.send(true);
    });

    engine
        .run(server, shutdown_rx)
        .await
        .context("ingestion stopped")
}

fn cmd_check_config(path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(path.as_deref())?;
    config.stream.validate()?;
    print!("{}", config.to_yaml()?);
    Ok(())
}
