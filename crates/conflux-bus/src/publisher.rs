use async_trait::async_trait;
use conflux_protocol::frames::EventEnvelope;

use crate::error::BusError;

/// Common interface for publishing a domain event onto the topic exchange.
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// across every Chat/Files/Voice Core handler task.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `envelope` on `routing_key`. Implementations should not block
    /// past a 3 s publication timeout; callers that need durability
    /// guarantees wrap this behind the outbox rather than relying on the
    /// publisher itself to retry.
    async fn publish(&self, routing_key: &str, envelope: &EventEnvelope) -> Result<(), BusError>;
}
