use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::warn;

use conflux_protocol::frames::EventEnvelope;

use crate::error::BusError;
use crate::publisher::Publisher;

/// Publishes onto Redis pub/sub. Stands in for a durable topic exchange —
/// durability itself comes from the outbox, not from Redis.
///
/// `ConnectionManager` already reconnects and retries transparently; it is
/// wrapped in a `Mutex` only because the crate's `publish` takes `&mut self`
/// on some versions and we want one shared handle across every caller.
pub struct RedisPublisher {
    conn: Mutex<ConnectionManager>,
}

impl RedisPublisher {
    pub async fn connect(redis_url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, routing_key: &str, envelope: &EventEnvelope) -> Result<(), BusError> {
        let payload = serde_json::to_string(envelope)?;
        let mut conn = self.conn.lock().await;
        let result: Result<i64, redis::RedisError> =
            conn.publish(format!("bus.{routing_key}"), payload).await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(routing_key, error = %e, "redis publish failed");
                Err(BusError::PublishFailed(e.to_string()))
            }
        }
    }
}

/// Publishes directly onto a user's real-time channel, used by the bridge consumer rather than
/// by Chat/Files/Voice Core callers.
pub struct RedisChannelPublisher {
    conn: Mutex<ConnectionManager>,
}

impl RedisChannelPublisher {
    pub async fn connect(redis_url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub async fn publish_to_channel(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        let mut conn = self.conn.lock().await;
        conn.publish::<_, _, i64>(channel, payload).await?;
        Ok(())
    }
}
