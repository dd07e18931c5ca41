pub mod telegram;

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message received from the platform.
///
/// The payload is kept exactly as the platform sent it. Accessors only read
/// well-known fields for logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Message(Value);

impl Message {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    /// Chat the message belongs to. Callback queries carry it on the
    /// attached message.
    pub fn chat_id(&self) -> Option<i64> {
        self.0
            .pointer("/chat/id")
            .or_else(|| self.0.pointer("/message/chat/id"))
            .and_then(Value::as_i64)
    }

    pub fn sender_id(&self) -> Option<i64> {
        self.0.pointer("/from/id").and_then(Value::as_i64)
    }

    /// Text body, or the payload for flavors without one (callback data,
    /// inline query string).
    pub fn text(&self) -> Option<&str> {
        ["text", "caption", "data", "query"]
            .iter()
            .find_map(|key| self.0.get(*key).and_then(Value::as_str))
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.0
            .get("date")
            .and_then(Value::as_i64)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Which payload field an update carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flavor {
    Chat,
    CallbackQuery,
    InlineQuery,
    ChosenInlineResult,
    ShippingQuery,
    PreCheckoutQuery,
    Other(String),
}

impl Flavor {
    fn from_field(field: &str) -> Self {
        match field {
            "message" | "edited_message" | "channel_post" | "edited_channel_post" => Flavor::Chat,
            "callback_query" => Flavor::CallbackQuery,
            "inline_query" => Flavor::InlineQuery,
            "chosen_inline_result" => Flavor::ChosenInlineResult,
            "shipping_query" => Flavor::ShippingQuery,
            "pre_checkout_query" => Flavor::PreCheckoutQuery,
            other => Flavor::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for Flavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Flavor::Chat => write!(f, "chat"),
            Flavor::CallbackQuery => write!(f, "callback_query"),
            Flavor::InlineQuery => write!(f, "inline_query"),
            Flavor::ChosenInlineResult => write!(f, "chosen_inline_result"),
            Flavor::ShippingQuery => write!(f, "shipping_query"),
            Flavor::PreCheckoutQuery => write!(f, "pre_checkout_query"),
            Flavor::Other(field) => write!(f, "{}", field),
        }
    }
}

/// One delivery from the platform: an id plus a single payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub update_id: i64,
    pub flavor: Flavor,
    pub message: Message,
}

impl Update {
    /// Split a raw update object into its id and payload. The first field
    /// other than `update_id` is the payload.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            anyhow::bail!("update is not a JSON object");
        };

        let update_id = fields
            .remove("update_id")
            .and_then(|id| id.as_i64())
            .context("update has no numeric update_id")?;

        let (field, payload) = fields
            .into_iter()
            .next()
            .with_context(|| format!("update {} carries no payload", update_id))?;

        Ok(Self {
            update_id,
            flavor: Flavor::from_field(&field),
            message: Message::new(payload),
        })
    }
}

/// Result of one getUpdates call.
///
/// `last_update_id` covers every entry the platform returned, including ones
/// that could not be decoded, so the next offset always moves past them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateBatch {
    pub updates: Vec<Update>,
    pub last_update_id: Option<i64>,
}

impl UpdateBatch {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.last_update_id.is_none()
    }

    /// Offset that acknowledges this batch, given the previous one.
    pub fn next_offset(&self, previous: Option<i64>) -> Option<i64> {
        match (previous, self.last_update_id) {
            (Some(prev), Some(last)) => Some(prev.max(last + 1)),
            (None, Some(last)) => Some(last + 1),
            (prev, None) => prev,
        }
    }
}

impl From<Vec<Update>> for UpdateBatch {
    fn from(updates: Vec<Update>) -> Self {
        let last_update_id = updates.iter().map(|u| u.update_id).max();
        Self {
            updates,
            last_update_id,
        }
    }
}

/// Identity returned by the platform for the configured credential.
#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    pub first_name: String,
}

/// Where the platform should deliver updates.
#[derive(Debug, Clone)]
pub struct WebhookRegistration {
    pub url: String,
    pub port: u16,
    pub certificate: Option<PathBuf>,
}

/// Calls made against the remote bot platform.
#[async_trait]
pub trait BotApi: Send + Sync {
    /// Authenticate the credential.
    async fn get_me(&self) -> Result<BotIdentity>;

    /// Long-poll for updates with `update_id >= offset`.
    async fn get_updates(&self, offset: Option<i64>, timeout_secs: u32) -> Result<UpdateBatch>;

    async fn delete_webhook(&self) -> Result<()>;

    async fn set_webhook(&self, registration: &WebhookRegistration) -> Result<()>;
}
