//! In-memory [`Bus`], backed by one `tokio::sync::broadcast` channel per
//! topic (gateway/arbitration tests only: spec.md §9 "storage layer is
//! pluggable (in-memory for tests)" applies equally to the bus).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{Bus, BusError, BusStream, Topic};

const CHANNEL_CAPACITY: usize = 256;

pub struct MemoryBus {
    topics: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        MemoryBus {
            topics: Mutex::new(HashMap::new()),
        }
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, topic: &Topic) -> broadcast::Sender<String> {
        let mut topics = self.topics.lock().expect("bus topic map poisoned");
        topics
            .entry(topic.as_str().to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, topic: &Topic, message: String) -> Result<(), BusError> {
        // No subscribers yet is not an error: spec.md §2 delivers
        // at-least-once "to current subscribers only".
        let _ = self.sender_for(topic).send(message);
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> Result<BusStream, BusError> {
        let rx = self.sender_for(topic).subscribe();
        let stream = BroadcastStream::new(rx).filter_map(|item| item.ok());
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::AuctionId;

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let bus = MemoryBus::new();
        let topic = Topic::auction(AuctionId::nil());
        let mut stream = bus.subscribe(&topic).await.unwrap();

        bus.publish(&topic, "hello".to_string()).await.unwrap();

        let received = tokio_stream::StreamExt::next(&mut stream).await;
        assert_eq!(received, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn late_subscriber_does_not_see_history() {
        let bus = MemoryBus::new();
        let topic = Topic::auction(AuctionId::nil());

        bus.publish(&topic, "before".to_string()).await.unwrap();
        let mut stream = bus.subscribe(&topic).await.unwrap();
        bus.publish(&topic, "after".to_string()).await.unwrap();

        let received = tokio_stream::StreamExt::next(&mut stream).await;
        assert_eq!(received, Some("after".to_string()));
    }

    #[tokio::test]
    async fn separate_topics_do_not_cross_talk() {
        let bus = MemoryBus::new();
        let topic_a = Topic::auction(AuctionId::nil());
        let topic_b = Topic::auction(AuctionId::new());

        let mut stream_b = bus.subscribe(&topic_b).await.unwrap();
        bus.publish(&topic_a, "for-a".to_string()).await.unwrap();
        bus.publish(&topic_b, "for-b".to_string()).await.unwrap();

        let received = tokio_stream::StreamExt::next(&mut stream_b).await;
        assert_eq!(received, Some("for-b".to_string()));
    }
}
