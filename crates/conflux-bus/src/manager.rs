use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use conflux_protocol::frames::EventEnvelope;

use crate::error::BusError;
use crate::outbox::OutboxStore;
use crate::publisher::Publisher;

/// Owns the chosen [`Publisher`] plus the durability outbox in front of it.
///
/// Every domain event goes through `publish_durable`: it is written to the
/// outbox first (so a process crash between DB commit and bus publish never
/// loses the event), then an immediate best-effort publish is attempted so
/// the common case has no added latency. The background sweep loop
/// (`spawn_sweep_loop`) picks up anything that immediate attempt missed.
pub struct BusManager {
    publisher: Arc<dyn Publisher>,
    outbox: Arc<OutboxStore>,
}

impl BusManager {
    pub fn new(publisher: Arc<dyn Publisher>, outbox: Arc<OutboxStore>) -> Self {
        Self { publisher, outbox }
    }

    /// Queue `envelope` for durable delivery and attempt to publish it
    /// immediately. Returns once the envelope is safely in the outbox, even
    /// if the immediate publish attempt below fails — the sweep loop owns
    /// retrying after that point.
    pub async fn publish_durable(
        &self,
        routing_key: &str,
        envelope: &EventEnvelope,
    ) -> Result<(), BusError> {
        let id = self.outbox.enqueue(routing_key, envelope)?;

        match self.publisher.publish(routing_key, envelope).await {
            Ok(()) => {
                // Clear the row immediately so the sweep loop doesn't
                // redeliver something already published. A concurrent sweep
                // racing this delete is harmless — DELETE on a missing row
                // is a no-op.
                if let Err(e) = self.outbox.delete(id) {
                    warn!(outbox_id = id, error = %e, "failed to clear outbox row after immediate publish");
                }
            }
            Err(e) => {
                warn!(routing_key, error = %e, "immediate publish failed, deferring to sweep loop");
            }
        }

        Ok(())
    }

    /// Run one sweep pass over due outbox rows.
    pub async fn sweep_once(&self) -> Result<crate::types::SweepReport, BusError> {
        self.outbox.sweep(self.publisher.as_ref()).await
    }

    /// Spawn a background task that sweeps the outbox on a fixed interval
    /// until the returned handle is dropped or aborted.
    pub fn spawn_sweep_loop(self: Arc<Self>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                match self.sweep_once().await {
                    Ok(report) if report.delivered > 0 || report.dead_lettered > 0 => {
                        info!(
                            delivered = report.delivered,
                            retried = report.retried,
                            dead_lettered = report.dead_lettered,
                            "outbox sweep completed"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "outbox sweep failed"),
                }
            }
        })
    }
}
