use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{error, warn};

use conflux_core::types::UserId;
use conflux_protocol::frames::{EventEnvelope, EventFrame};

use crate::error::BusError;

/// Sink the bridge forwards resolved per-user events into. Implemented by
/// `conflux-gateway`'s WS fan-out registry; kept as a trait here so
/// `conflux-bus` never depends on the gateway crate.
#[async_trait]
pub trait ChannelSink: Send + Sync {
    async fn send_to_user(&self, user_id: &UserId, payload: String);
}

/// Subscribes to every routing key on the topic exchange and resolves each
/// envelope's `participants[]` into the per-user channel `user:<user_id>`
///, preserving publish order per recipient by processing
/// messages off the subscription stream serially rather than spawning a
/// task per message.
pub struct BridgeConsumer {
    redis_url: String,
}

impl BridgeConsumer {
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
        }
    }

    /// Run the consume loop until the connection drops or is cancelled.
    /// Callers should wrap this in a reconnect loop with backoff, mirroring
    /// how the media-engine driver handles its own socket.
    pub async fn run(&self, sink: &dyn ChannelSink) -> Result<(), BusError> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.psubscribe("bus.*").await?;

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "dropping bus message with non-utf8 payload");
                    continue;
                }
            };

            let envelope: EventEnvelope = match serde_json::from_str(&payload) {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "dropping malformed bus envelope");
                    continue;
                }
            };

            self.dispatch(&envelope, sink).await;
        }

        Ok(())
    }

    async fn dispatch(&self, envelope: &EventEnvelope, sink: &dyn ChannelSink) {
        let frame = EventFrame::from_envelope(envelope);
        let payload = match serde_json::to_string(&frame) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "failed to serialize event frame, dropping");
                return;
            }
        };

        for user_id in &envelope.participants {
            sink.send_to_user(user_id, payload.clone()).await;
        }
    }
}
