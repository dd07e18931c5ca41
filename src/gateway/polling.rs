use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PollingConfig;
use crate::gateway::{dispatch, Route};
use crate::handler::MessageHandler;
use crate::platform::telegram::TelegramClient;
use crate::platform::BotApi;

/// Long-polls the platform and hands every message to the handler.
pub struct PollingGateway {
    api: Arc<dyn BotApi>,
    handler: Arc<dyn MessageHandler>,
    timeout_secs: u32,
}

impl PollingGateway {
    pub fn new(config: &PollingConfig, handler: Arc<dyn MessageHandler>) -> Self {
        let api = Arc::new(TelegramClient::new(&config.token, &config.api_url));
        Self::with_api(api, handler, config.timeout_secs)
    }

    pub fn with_api(
        api: Arc<dyn BotApi>,
        handler: Arc<dyn MessageHandler>,
        timeout_secs: u32,
    ) -> Self {
        Self {
            api,
            handler,
            timeout_secs,
        }
    }

    /// Run until `shutdown` is cancelled. A failed fetch ends the loop with
    /// the error; nothing is retried. Returns how many messages were handled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<usize> {
        let me = self
            .api
            .get_me()
            .await
            .context("Failed to authenticate with the bot platform")?;
        info!(
            "Polling as @{} ({})",
            me.username.as_deref().unwrap_or(&me.first_name),
            me.id
        );

        let mut offset: Option<i64> = None;
        let mut handled = 0;

        loop {
            let batch = tokio::select! {
                _ = shutdown.cancelled() => break,
                batch = self.api.get_updates(offset, self.timeout_secs) => {
                    batch.context("Failed to fetch updates")?
                }
            };

            if !batch.is_empty() {
                debug!(
                    "Fetched {} update(s), last id {:?}",
                    batch.updates.len(),
                    batch.last_update_id
                );
            }

            offset = batch.next_offset(offset);
            for update in batch.updates {
                if dispatch(update, Route::AllFlavors, self.handler.as_ref()).await {
                    handled += 1;
                }
            }
        }

        info!("Polling stopped after {} message(s)", handled);
        Ok(handled)
    }

    /// Run on a background task, returning its handle.
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<Result<usize>> {
        tokio::spawn(self.run(shutdown))
    }
}
