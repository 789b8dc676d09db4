//! In-process publish/subscribe hub for row-change events.
//!
//! Topics mirror the channel names the mobile client subscribes to:
//! `chat-conv-<conversation_id>` for messages and `notifications:<user_id>`
//! for the notification feed. Publishing to a topic nobody listens on is a
//! no-op.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Insert,
    Update,
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub topic: String,
    pub kind: EventKind,
    pub payload: serde_json::Value,
}

pub fn conversation_topic(conversation_id: &str) -> String {
    format!("chat-conv-{}", conversation_id)
}

pub fn notification_topic(user_id: &str) -> String {
    format!("notifications:{}", user_id)
}

#[derive(Clone, Default)]
pub struct ChannelHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Event>>>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Event> {
        let mut channels = self.channels.lock().expect("hub lock poisoned");
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn publish(&self, topic: &str, kind: EventKind, payload: serde_json::Value) {
        let mut channels = self.channels.lock().expect("hub lock poisoned");
        let Some(sender) = channels.get(topic) else {
            debug!("no subscribers on {}, dropping event", topic);
            return;
        };
        if sender.send(Event {
            topic: topic.to_string(),
            kind,
            payload,
        })
        .is_err()
        {
            // Last receiver went away; drop the channel so the map stays small.
            channels.remove(topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let hub = ChannelHub::new();
        let topic = conversation_topic("c1");
        let mut rx = hub.subscribe(&topic);

        hub.publish(&topic, EventKind::Insert, serde_json::json!({"id": "m1"}));

        let event = rx.recv().await.expect("event");
        assert_eq!(event.kind, EventKind::Insert);
        assert_eq!(event.payload["id"], "m1");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let hub = ChannelHub::new();
        hub.publish("nobody-home", EventKind::Update, serde_json::json!({}));
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag_after_capacity_overrun() {
        let hub = ChannelHub::new();
        let mut rx = hub.subscribe("busy");

        // Overrun the channel without draining the receiver.
        for i in 0..(CHANNEL_CAPACITY + 8) {
            hub.publish("busy", EventKind::Insert, serde_json::json!({"seq": i}));
        }

        // The first recv reports the overrun; the stream handler treats this
        // as a disconnect.
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => assert!(n >= 8),
            other => panic!("expected Lagged, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn channel_is_dropped_after_last_receiver() {
        let hub = ChannelHub::new();
        let rx = hub.subscribe("t");
        drop(rx);
        hub.publish("t", EventKind::Insert, serde_json::json!({}));
        assert!(hub.channels.lock().unwrap().get("t").is_none());
    }
}
