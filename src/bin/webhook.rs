//! Webhook gateway: registers the public URL with the platform, then serves
//! `GET`/`POST /webhook` over HTTPS and prints every chat message.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use botgate::config::{Settings, WebhookConfig};
use botgate::gateway::webhook::WebhookGateway;
use botgate::handler::PrintHandler;
use botgate::platform::telegram::mask_token;

#[derive(Parser, Debug)]
#[command(version, about = "Print every chat message delivered to the bot's webhook")]
struct Args {
    /// Bot API token
    token: String,

    /// Port to listen on (the platform accepts 443, 80, 88 or 8443)
    port: u16,

    /// Public URL the platform will POST updates to
    url: String,

    /// Optional TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    botgate::logging::init();

    let args = Args::parse();
    let settings = Settings::load_optional(args.config.as_deref())?;
    let config = WebhookConfig::new(args.token, args.port, args.url, &settings);

    info!("Starting webhook gateway");
    info!("  Token: {}", mask_token(&config.token));
    info!("  Public URL: {}", config.public_url);
    info!("  Listen: {}:{}", config.bind, config.port);
    info!("  Certificate: {}", config.certificate.display());

    let shutdown = CancellationToken::new();
    let gateway = WebhookGateway::new(config, Arc::new(PrintHandler::stdout()));
    let mut task = tokio::spawn(gateway.run(shutdown.clone()));

    tokio::select! {
        result = &mut task => {
            return result.context("Webhook task panicked")?.map(|_| ());
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Ctrl-C received, stopping");
        }
    }

    shutdown.cancel();
    task.await.context("Webhook task panicked")??;
    Ok(())
}
