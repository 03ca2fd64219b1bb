//! Pub/Sub Bus (C2, spec.md §2, §6.2).
//!
//! Topic-based, one topic per auction, at-least-once delivery to currently
//! connected subscribers only, no history. `redis` backs production
//! (`original_source/services/realtime/utils/redis.py`'s `pubsub()` /
//! `listen()` pair, ported to the `redis` crate's async multiplexed API);
//! `memory` backs gateway unit tests that don't want a live broker.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// `auction:{auction_id}` (spec.md §6.2). A newtype so callers can't hand a
/// bare user-supplied string to `publish`/`subscribe` without going through
/// `Topic::auction`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    pub fn auction(auction_id: domain::AuctionId) -> Self {
        Topic(format!("auction:{}", auction_id.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus connection failed: {0}")]
    Connection(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

/// A message pulled off a subscription. The bus treats bodies as opaque
/// UTF-8 JSON (spec.md §6.2: "the UTF-8 JSON encoding of the NEW_BID
/// frame"). It never parses them itself.
pub type BusStream = BoxStream<'static, String>;

/// The Connection Gateway's seam onto C2. `publish`/`subscribe` both take a
/// [`Topic`] rather than a raw string so every caller goes through
/// `Topic::auction`.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish(&self, topic: &Topic, message: String) -> Result<(), BusError>;

    /// Returns a stream that yields every message published to `topic`
    /// from this point forward. No history is replayed (spec.md §8
    /// "Publishing a NEW_BID and re-subscribing does not replay older
    /// messages").
    async fn subscribe(&self, topic: &Topic) -> Result<BusStream, BusError>;
}
