use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use botgate::config::{PollingConfig, Settings};
use botgate::gateway::polling::PollingGateway;
use botgate::handler::PrintHandler;
use botgate::platform::telegram::mask_token;

/// Print every message the bot receives, fetched by long-polling.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Bot API token
    token: String,

    /// Optional TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    botgate::logging::init();

    let args = Args::parse();
    let settings = Settings::load_optional(args.config.as_deref())?;
    let config = PollingConfig::new(args.token, &settings);

    info!("Starting polling gateway");
    info!("  Token: {}", mask_token(&config.token));
    info!("  API: {}", config.api_url);
    info!("  Poll timeout: {}s", config.timeout_secs);

    let shutdown = CancellationToken::new();
    let gateway = PollingGateway::new(&config, Arc::new(PrintHandler::stdout()));
    let mut task = gateway.spawn(shutdown.clone());

    tokio::select! {
        result = &mut task => {
            return result.context("Polling task panicked")?.map(|_| ());
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Ctrl-C received, stopping");
        }
    }

    shutdown.cancel();
    task.await.context("Polling task panicked")??;
    Ok(())
}
