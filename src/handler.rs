use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{error, info};

use crate::platform::Message;

/// Receives every message a gateway delivers, once each, in order.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message);
}

/// Pretty-prints each message as JSON.
pub struct PrintHandler<W: Write + Send> {
    out: Mutex<W>,
}

impl PrintHandler<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> PrintHandler<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<W: Write + Send> MessageHandler for PrintHandler<W> {
    async fn handle(&self, message: Message) {
        info!(
            "Message in chat {:?} from {:?} at {:?}: {}",
            message.chat_id(),
            message.sender_id(),
            message.sent_at(),
            message.text().unwrap_or("<no text>")
        );

        let rendered = match serde_json::to_string_pretty(&message) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to render message: {}", e);
                return;
            }
        };

        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(out, "{}", rendered).and_then(|_| out.flush()) {
            error!("Failed to print message: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_prints_pretty_json() {
        let handler = PrintHandler::new(Vec::new());
        handler
            .handle(Message::new(json!({"chat": {"id": 1}, "text": "hi"})))
            .await;

        let printed = String::from_utf8(handler.into_inner()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&printed).unwrap();
        assert_eq!(parsed, json!({"chat": {"id": 1}, "text": "hi"}));
        assert!(printed.contains("\n  \"chat\""));
    }

    #[tokio::test]
    async fn test_prints_one_block_per_message() {
        let handler = PrintHandler::new(Vec::new());
        handler.handle(Message::new(json!({"text": "a"}))).await;
        handler.handle(Message::new(json!({"text": "b"}))).await;

        let printed = String::from_utf8(handler.into_inner()).unwrap();
        let a = printed.find("\"a\"").unwrap();
        let b = printed.find("\"b\"").unwrap();
        assert!(a < b);
        assert_eq!(printed.matches('{').count(), 2);
    }
}
