use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    routing::get,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::WebhookConfig;
use crate::gateway::ordered::{ordered_queue, OrderedFeeder};
use crate::gateway::Route;
use crate::handler::MessageHandler;
use crate::platform::telegram::TelegramClient;
use crate::platform::{BotApi, WebhookRegistration};

pub const WEBHOOK_PATH: &str = "/webhook";

/// Ports the platform will deliver webhooks to.
pub const SUPPORTED_PORTS: [u16; 4] = [443, 80, 88, 8443];

/// Serves `/webhook` over HTTPS and feeds bodies to the handler in arrival
/// order.
pub struct WebhookGateway {
    api: Arc<dyn BotApi>,
    handler: Arc<dyn MessageHandler>,
    config: WebhookConfig,
}

impl WebhookGateway {
    pub fn new(config: WebhookConfig, handler: Arc<dyn MessageHandler>) -> Self {
        let api = Arc::new(TelegramClient::new(&config.token, &config.api_url));
        Self::with_api(api, handler, config)
    }

    pub fn with_api(
        api: Arc<dyn BotApi>,
        handler: Arc<dyn MessageHandler>,
        config: WebhookConfig,
    ) -> Self {
        Self {
            api,
            handler,
            config,
        }
    }

    /// Authenticate, drop any previous registration, then register this
    /// endpoint. The delete always happens before the set.
    pub async fn register(&self) -> Result<()> {
        let me = self
            .api
            .get_me()
            .await
            .context("Failed to authenticate with the bot platform")?;
        info!(
            "Serving webhook for @{} ({})",
            me.username.as_deref().unwrap_or(&me.first_name),
            me.id
        );

        if !SUPPORTED_PORTS.contains(&self.config.port) {
            warn!(
                "Port {} is not one of {:?}; the platform may refuse to deliver",
                self.config.port, SUPPORTED_PORTS
            );
        }

        self.api
            .delete_webhook()
            .await
            .context("Failed to delete previous webhook")?;

        let registration = WebhookRegistration {
            url: self.config.public_url.clone(),
            port: self.config.port,
            certificate: Some(self.config.certificate.clone()),
        };
        self.api
            .set_webhook(&registration)
            .await
            .with_context(|| format!("Failed to set webhook to {}", registration.url))?;

        info!("Webhook registered at {}", registration.url);
        Ok(())
    }

    /// Register, then serve until `shutdown` is cancelled. Bodies already
    /// queued when the server stops are still handled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<usize> {
        self.register().await?;

        let addr: SocketAddr = format!("{}:{}", self.config.bind, self.config.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    self.config.bind, self.config.port
                )
            })?;

        let _ = rustls::crypto::ring::default_provider().install_default();
        let tls = RustlsConfig::from_pem_file(&self.config.certificate, &self.config.private_key)
            .await
            .with_context(|| {
                format!(
                    "Failed to load TLS certificate {} / key {}",
                    self.config.certificate.display(),
                    self.config.private_key.display()
                )
            })?;

        let (feeder, consumer) = ordered_queue(self.handler.clone(), Route::ChatOnly);
        let drain = CancellationToken::new();
        let consumer = tokio::spawn(consumer.run(drain.clone()));

        let handle = axum_server::Handle::new();
        let stopper = handle.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            info!("Shutting down webhook server");
            stopper.graceful_shutdown(Some(Duration::from_secs(5)));
        });

        info!("Webhook listening on https://{}{}", addr, WEBHOOK_PATH);
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(router(feeder).into_make_service())
            .await
            .context("Webhook server error")?;

        drain.cancel();
        consumer.await.context("Ordered queue consumer panicked")
    }
}

/// `GET` and `POST` on the webhook path, both answering `OK`. Bodies of any
/// size are accepted.
pub fn router(feeder: OrderedFeeder) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, get(receive).post(receive))
        .layer(DefaultBodyLimit::disable())
        .with_state(feeder)
}

async fn receive(State(feeder): State<OrderedFeeder>, body: Bytes) -> &'static str {
    if !feeder.feed(body) {
        warn!("Ordered queue is closed; dropping webhook body");
    }
    "OK"
}
