use conflux_protocol::frames::EventEnvelope;
use serde::{Deserialize, Serialize};

/// Runtime connection state of the bus transport, surfaced for health checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusStatus {
    Connected,
    Connecting,
    Disconnected,
    Error(String),
}

/// A durably queued envelope awaiting (re)delivery. Rows live in the `outbox` table.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: i64,
    pub envelope: EventEnvelope,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Outcome of one outbox sweep pass, returned for logging/metrics.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub delivered: u32,
    pub retried: u32,
    pub dead_lettered: u32,
}
