//! Single-consumer queue that keeps webhook bodies in arrival order.
//!
//! Request handlers call [`OrderedFeeder::feed`] without awaiting, so the
//! enqueue order is the order requests reached the handler. One
//! [`OrderedConsumer`] decodes and dispatches them strictly in that order,
//! awaiting each handler call before starting the next.

use std::sync::Arc;

use axum::body::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::gateway::{dispatch, Route};
use crate::handler::MessageHandler;
use crate::platform::Update;

/// Producer side. Cheap to clone into every request handler.
#[derive(Clone)]
pub struct OrderedFeeder {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl OrderedFeeder {
    /// Enqueue a raw body. Fails only once the consumer is gone.
    pub fn feed(&self, body: Bytes) -> bool {
        self.tx.send(body).is_ok()
    }
}

/// Consumer side. Exactly one exists per queue.
pub struct OrderedConsumer {
    rx: mpsc::UnboundedReceiver<Bytes>,
    handler: Arc<dyn MessageHandler>,
    route: Route,
}

pub fn ordered_queue(
    handler: Arc<dyn MessageHandler>,
    route: Route,
) -> (OrderedFeeder, OrderedConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        OrderedFeeder { tx },
        OrderedConsumer { rx, handler, route },
    )
}

impl OrderedConsumer {
    /// Drain until every feeder is dropped or `stop` is cancelled. After a
    /// stop, new feeds are refused but bodies already queued are still
    /// handled. Returns how many messages were handed to the handler.
    pub async fn run(mut self, stop: CancellationToken) -> usize {
        let mut handled = 0;
        let mut closed = false;
        loop {
            let body = tokio::select! {
                biased;
                _ = stop.cancelled(), if !closed => {
                    self.rx.close();
                    closed = true;
                    continue;
                }
                body = self.rx.recv() => match body {
                    Some(body) => body,
                    None => break,
                },
            };

            for update in decode_body(&body) {
                if dispatch(update, self.route, self.handler.as_ref()).await {
                    handled += 1;
                }
            }
        }
        info!("Ordered queue drained after {} message(s)", handled);
        handled
    }
}

/// Decode a webhook body into zero or more updates. An empty body yields
/// nothing, an object one update, an array one per element. Anything that
/// does not decode is logged and dropped.
pub fn decode_body(body: &[u8]) -> Vec<Update> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Vec::new();
    }

    let values = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Array(items)) => items,
        Ok(value) => vec![value],
        Err(e) => {
            warn!("Dropping undecodable webhook body ({} bytes): {}", body.len(), e);
            return Vec::new();
        }
    };

    values
        .into_iter()
        .filter_map(|value| match Update::from_value(value) {
            Ok(update) => Some(update),
            Err(e) => {
                warn!("Dropping webhook update: {:#}", e);
                None
            }
        })
        .inspect(|update| debug!("Decoded update {}", update.update_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::RecordingHandler;
    use crate::platform::Flavor;
    use serde_json::json;
    use std::time::Duration;

    fn chat_body(update_id: i64, text: &str) -> Bytes {
        Bytes::from(
            json!({"update_id": update_id, "message": {"chat": {"id": 1}, "text": text}}).to_string(),
        )
    }

    #[test]
    fn test_decode_empty_body() {
        assert!(decode_body(b"").is_empty());
        assert!(decode_body(b" \n").is_empty());
    }

    #[test]
    fn test_decode_single_and_batch() {
        let one = decode_body(&chat_body(1, "x"));
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].flavor, Flavor::Chat);

        let batch = json!([
            {"update_id": 2, "message": {"text": "a"}},
            {"update_id": 3, "callback_query": {"data": "b"}}
        ])
        .to_string();
        let many = decode_body(batch.as_bytes());
        assert_eq!(many.iter().map(|u| u.update_id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_decode_malformed_body() {
        assert!(decode_body(b"{not json").is_empty());
        assert!(decode_body(b"\"just a string\"").is_empty());
    }

    #[tokio::test]
    async fn test_handles_in_arrival_order_despite_slow_handler() {
        let handler = Arc::new(RecordingHandler {
            slow_text: Some(("A".to_string(), Duration::from_millis(50))),
            ..Default::default()
        });
        let (feeder, consumer) = ordered_queue(handler.clone(), Route::ChatOnly);
        let consumer = tokio::spawn(consumer.run(CancellationToken::new()));

        assert!(feeder.feed(chat_body(1, "A")));
        assert!(feeder.feed(chat_body(2, "B")));
        assert!(feeder.feed(chat_body(3, "C")));
        drop(feeder);

        assert_eq!(consumer.await.unwrap(), 3);
        assert_eq!(handler.texts(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_concurrent_feeders_keep_enqueue_order() {
        let handler = Arc::new(RecordingHandler::default());
        let (feeder, consumer) = ordered_queue(handler.clone(), Route::ChatOnly);
        let consumer = tokio::spawn(consumer.run(CancellationToken::new()));

        // A enqueues first but its producer finishes last.
        let (a_queued_tx, a_queued_rx) = tokio::sync::oneshot::channel();
        let feeder_a = feeder.clone();
        let a = tokio::spawn(async move {
            feeder_a.feed(chat_body(1, "A"));
            let _ = a_queued_tx.send(());
            tokio::time::sleep(Duration::from_millis(30)).await;
        });
        let feeder_b = feeder.clone();
        let b = tokio::spawn(async move {
            a_queued_rx.await.unwrap();
            feeder_b.feed(chat_body(2, "B"));
        });

        b.await.unwrap();
        a.await.unwrap();
        drop(feeder);

        consumer.await.unwrap();
        assert_eq!(handler.texts(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_skips_non_chat_flavors() {
        let handler = Arc::new(RecordingHandler::default());
        let (feeder, consumer) = ordered_queue(handler.clone(), Route::ChatOnly);

        feeder.feed(Bytes::from(
            json!({"update_id": 1, "inline_query": {"query": "q"}}).to_string(),
        ));
        feeder.feed(chat_body(2, "kept"));
        drop(feeder);

        assert_eq!(consumer.run(CancellationToken::new()).await, 1);
        assert_eq!(handler.texts(), vec!["kept"]);
    }

    #[tokio::test]
    async fn test_stop_drains_queued_and_refuses_new() {
        let handler = Arc::new(RecordingHandler::default());
        let (feeder, consumer) = ordered_queue(handler.clone(), Route::ChatOnly);
        let stop = CancellationToken::new();

        feeder.feed(chat_body(1, "queued"));
        stop.cancel();
        let handled = consumer.run(stop).await;

        assert_eq!(handled, 1);
        assert_eq!(handler.texts(), vec!["queued"]);
        assert!(!feeder.feed(chat_body(2, "late")));
    }

    #[tokio::test]
    async fn test_feed_fails_after_consumer_dropped() {
        let (feeder, consumer) =
            ordered_queue(Arc::new(RecordingHandler::default()), Route::ChatOnly);
        drop(consumer);
        assert!(!feeder.feed(Bytes::from_static(b"{}")));
    }
}
