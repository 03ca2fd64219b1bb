//! Redis-backed [`Bus`] (production C2, spec.md §6.5 `BUS_URL`).
//!
//! Publish goes over a cloneable multiplexed connection (cheap to share
//! across bid-handling tasks); each `subscribe` opens its own dedicated
//! pub/sub connection, mirroring `redis.asyncio`'s `client.pubsub()` one
//! connection per listener in
//! `original_source/services/realtime/utils/redis.py`.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::warn;

use crate::{Bus, BusError, BusStream, Topic};

pub struct RedisBus {
    client: redis::Client,
    publish_conn: MultiplexedConnection,
}

impl RedisBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url).map_err(|e| BusError::Connection(e.to_string()))?;
        let publish_conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(RedisBus { client, publish_conn })
    }
}

#[async_trait]
impl Bus for RedisBus {
    async fn publish(&self, topic: &Topic, message: String) -> Result<(), BusError> {
        let mut conn = self.publish_conn.clone();
        conn.publish::<_, _, ()>(topic.as_str(), message)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }

    async fn subscribe(&self, topic: &Topic) -> Result<BusStream, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;
        pubsub
            .subscribe(topic.as_str())
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(error = %e, "dropping non-UTF8 bus message");
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
