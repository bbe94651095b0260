use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{error, info, warn};

use conflux_protocol::frames::EventEnvelope;

use crate::error::BusError;
use crate::publisher::Publisher;
use crate::types::{OutboxEntry, SweepReport};

/// Minimum delay before the first redelivery attempt (seconds).
const BACKOFF_BASE_SECS: i64 = 5;
/// Maximum delay between redelivery attempts (seconds).
const BACKOFF_MAX_SECS: i64 = 300;

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS outbox (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            routing_key TEXT NOT NULL,
            envelope_json TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            next_attempt_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_outbox_pending
            ON outbox (status, next_attempt_at)",
        [],
    )?;
    Ok(())
}

/// Durable at-least-once delivery queue backing `Publisher::publish`
///.
pub struct OutboxStore {
    conn: Arc<Mutex<Connection>>,
    max_attempts: u32,
}

impl OutboxStore {
    pub fn new(conn: Arc<Mutex<Connection>>, max_attempts: u32) -> Self {
        Self { conn, max_attempts }
    }

    /// Queue an envelope for immediate delivery on the next sweep.
    pub fn enqueue(&self, routing_key: &str, envelope: &EventEnvelope) -> Result<i64, BusError> {
        let json = serde_json::to_string(envelope)?;
        let now = Utc::now();
        let conn = self.conn.lock().expect("outbox connection poisoned");
        conn.execute(
            "INSERT INTO outbox (routing_key, envelope_json, attempts, status, created_at, next_attempt_at)
             VALUES (?1, ?2, 0, 'pending', ?3, ?3)",
            params![routing_key, json, now.to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Attempt delivery of every pending, due row via `publisher`. Rows that
    /// publish successfully are deleted; rows that fail get their attempt
    /// count bumped and `next_attempt_at` pushed out by exponential backoff;
    /// rows that exceed `max_attempts` are marked `dead` and left for
    /// operator inspection rather than retried forever.
    pub async fn sweep(&self, publisher: &dyn Publisher) -> Result<SweepReport, BusError> {
        let due = self.due_entries()?;
        let mut report = SweepReport::default();

        for entry in due {
            match publisher.publish(&entry_routing_key(&entry), &entry.envelope).await {
                Ok(()) => {
                    self.delete(entry.id)?;
                    report.delivered += 1;
                }
                Err(e) => {
                    let attempts = entry.attempts + 1;
                    if attempts >= self.max_attempts {
                        warn!(
                            outbox_id = entry.id,
                            attempts,
                            error = %e,
                            "dead-lettering outbox entry after exhausting retries"
                        );
                        self.mark_dead(entry.id, &e.to_string())?;
                        report.dead_lettered += 1;
                    } else {
                        let delay = backoff_secs(attempts);
                        info!(
                            outbox_id = entry.id,
                            attempts,
                            retry_after_secs = delay,
                            "outbox publish failed, scheduling retry"
                        );
                        self.reschedule(entry.id, attempts, &e.to_string(), delay)?;
                        report.retried += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    fn due_entries(&self) -> Result<Vec<OutboxEntry>, BusError> {
        let conn = self.conn.lock().expect("outbox connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, envelope_json, attempts, last_error
             FROM outbox
             WHERE status = 'pending' AND next_attempt_at <= ?1
             ORDER BY id ASC",
        )?;
        let now = Utc::now().to_rfc3339();
        let rows = stmt
            .query_map(params![now], |row| {
                let id: i64 = row.get(0)?;
                let envelope_json: String = row.get(1)?;
                let attempts: u32 = row.get(2)?;
                let last_error: Option<String> = row.get(3)?;
                Ok((id, envelope_json, attempts, last_error))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (id, envelope_json, attempts, last_error) in rows {
            let envelope: EventEnvelope = serde_json::from_str(&envelope_json)?;
            entries.push(OutboxEntry {
                id,
                envelope,
                attempts,
                last_error,
            });
        }
        Ok(entries)
    }

    pub fn delete(&self, id: i64) -> Result<(), BusError> {
        let conn = self.conn.lock().expect("outbox connection poisoned");
        conn.execute("DELETE FROM outbox WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn reschedule(&self, id: i64, attempts: u32, error: &str, delay_secs: i64) -> Result<(), BusError> {
        let next = Utc::now() + ChronoDuration::seconds(delay_secs);
        let conn = self.conn.lock().expect("outbox connection poisoned");
        conn.execute(
            "UPDATE outbox SET attempts = ?1, last_error = ?2, next_attempt_at = ?3 WHERE id = ?4",
            params![attempts, error, next.to_rfc3339(), id],
        )?;
        Ok(())
    }

    fn mark_dead(&self, id: i64, error: &str) -> Result<(), BusError> {
        let conn = self.conn.lock().expect("outbox connection poisoned");
        conn.execute(
            "UPDATE outbox SET status = 'dead', last_error = ?1 WHERE id = ?2",
            params![error, id],
        )?;
        Ok(())
    }

    /// List dead-lettered entries for operator inspection/tooling.
    pub fn dead_letters(&self) -> Result<Vec<OutboxEntry>, BusError> {
        let conn = self.conn.lock().expect("outbox connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, envelope_json, attempts, last_error FROM outbox WHERE status = 'dead' ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let envelope_json: String = row.get(1)?;
                let attempts: u32 = row.get(2)?;
                let last_error: Option<String> = row.get(3)?;
                Ok((id, envelope_json, attempts, last_error))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut entries = Vec::with_capacity(rows.len());
        for (id, envelope_json, attempts, last_error) in rows {
            let envelope: EventEnvelope = serde_json::from_str(&envelope_json)?;
            entries.push(OutboxEntry {
                id,
                envelope,
                attempts,
                last_error,
            });
        }
        Ok(entries)
    }

    /// Look up a single entry, used by tests and operator tooling.
    pub fn get(&self, id: i64) -> Result<Option<OutboxEntry>, BusError> {
        let conn = self.conn.lock().expect("outbox connection poisoned");
        conn.query_row(
            "SELECT id, envelope_json, attempts, last_error FROM outbox WHERE id = ?1",
            params![id],
            |row| {
                let id: i64 = row.get(0)?;
                let envelope_json: String = row.get(1)?;
                let attempts: u32 = row.get(2)?;
                let last_error: Option<String> = row.get(3)?;
                Ok((id, envelope_json, attempts, last_error))
            },
        )
        .optional()?
        .map(|(id, envelope_json, attempts, last_error)| {
            Ok(OutboxEntry {
                id,
                envelope: serde_json::from_str(&envelope_json)?,
                attempts,
                last_error,
            })
        })
        .transpose()
    }
}

fn entry_routing_key(entry: &OutboxEntry) -> String {
    entry.envelope.routing_key.to_string()
}

fn backoff_secs(attempts: u32) -> i64 {
    let shift = attempts.saturating_sub(1).min(20);
    (BACKOFF_BASE_SECS * (1i64 << shift)).min(BACKOFF_MAX_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_secs(1), 5);
        assert_eq!(backoff_secs(2), 10);
        assert_eq!(backoff_secs(3), 20);
        assert_eq!(backoff_secs(10), BACKOFF_MAX_SECS);
    }

    #[test]
    fn enqueue_and_fetch_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let store = OutboxStore::new(Arc::new(Mutex::new(conn)), 5);

        let envelope = EventEnvelope::new(
            conflux_protocol::frames::RoutingKey::Typing,
            conflux_core::types::UserId::new(),
            vec![],
            serde_json::json!({}),
        );
        let id = store.enqueue("typing", &envelope).unwrap();
        let fetched = store.get(id).unwrap().expect("row should exist");
        assert_eq!(fetched.attempts, 0);
    }
}
