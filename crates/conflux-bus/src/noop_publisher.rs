use async_trait::async_trait;
use conflux_protocol::frames::EventEnvelope;

use crate::error::BusError;
use crate::publisher::Publisher;

/// Publisher that discards everything. Used by unit tests for Chat/Files/
/// Voice Core that want to exercise the publish call site without a live
/// Redis instance.
#[derive(Debug, Default)]
pub struct NoopPublisher;

#[async_trait]
impl Publisher for NoopPublisher {
    async fn publish(&self, _routing_key: &str, _envelope: &EventEnvelope) -> Result<(), BusError> {
        Ok(())
    }
}
