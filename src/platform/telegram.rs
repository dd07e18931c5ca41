//! Bot API client over plain reqwest. Updates stay raw JSON end to end, so
//! no framework client with its own typed update model is used.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::platform::{BotApi, BotIdentity, Update, UpdateBatch, WebhookRegistration};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u32,
}

#[derive(Debug, Serialize)]
struct SetWebhookRequest<'a> {
    url: &'a str,
}

/// Hide the secret half of a bot token (`<bot id>:<secret>`).
pub fn mask_token(token: &str) -> String {
    match token.split_once(':') {
        Some((id, _)) => format!("{}:***", id),
        None if token.chars().count() > 4 => {
            format!("{}***", token.chars().take(4).collect::<String>())
        }
        None => "***".to_string(),
    }
}

/// Telegram Bot API client
pub struct TelegramClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    /// POST a JSON body to a Bot API method and unwrap the envelope.
    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(
            "Calling {} on {}/bot{}",
            method,
            self.api_url,
            mask_token(&self.token)
        );

        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        Self::unwrap_response(method, response).await
    }

    async fn unwrap_response<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", method))?;

        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(e).with_context(|| format!("Failed to parse {} response", method));
            }
            Err(_) => anyhow::bail!("Bot API error ({}) on {}: {}", status, method, body),
        };

        if !envelope.ok || !status.is_success() {
            anyhow::bail!(
                "Bot API error ({}) on {}: {}",
                envelope.error_code.map_or_else(|| status.to_string(), |c| c.to_string()),
                method,
                envelope.description.unwrap_or_default()
            );
        }

        envelope
            .result
            .with_context(|| format!("{} response has no result", method))
    }
}

#[async_trait]
impl BotApi for TelegramClient {
    async fn get_me(&self) -> Result<BotIdentity> {
        self.call("getMe", &serde_json::json!({})).await
    }

    async fn get_updates(&self, offset: Option<i64>, timeout_secs: u32) -> Result<UpdateBatch> {
        let raw: Vec<Value> = self
            .call(
                "getUpdates",
                &GetUpdatesRequest {
                    offset,
                    timeout: timeout_secs,
                },
            )
            .await?;

        // Ids of skipped entries still count, or they would be redelivered.
        let mut batch = UpdateBatch::default();
        for value in raw {
            let update_id = value.get("update_id").and_then(Value::as_i64);
            batch.last_update_id = batch.last_update_id.max(update_id);

            match Update::from_value(value) {
                Ok(update) => batch.updates.push(update),
                Err(e) => warn!("Skipping undecodable update: {:#}", e),
            }
        }
        Ok(batch)
    }

    async fn delete_webhook(&self) -> Result<()> {
        let _: bool = self.call("deleteWebhook", &serde_json::json!({})).await?;
        Ok(())
    }

    async fn set_webhook(&self, registration: &WebhookRegistration) -> Result<()> {
        let _: bool = match &registration.certificate {
            Some(path) => {
                let pem = tokio::fs::read(path).await.with_context(|| {
                    format!("Failed to read webhook certificate: {}", path.display())
                })?;
                let certificate = reqwest::multipart::Part::bytes(pem).file_name("certificate.pem");
                let form = reqwest::multipart::Form::new()
                    .text("url", registration.url.clone())
                    .part("certificate", certificate);

                debug!(
                    "Calling setWebhook for port {} with certificate {}",
                    registration.port,
                    path.display()
                );
                let response = self
                    .client
                    .post(self.method_url("setWebhook"))
                    .multipart(form)
                    .send()
                    .await
                    .context("Failed to send setWebhook request")?;
                Self::unwrap_response("setWebhook", response).await?
            }
            None => {
                self.call(
                    "setWebhook",
                    &SetWebhookRequest {
                        url: &registration.url,
                    },
                )
                .await?
            }
        };
        Ok(())
    }
}
