//! Media-engine driver: a line-oriented text-command socket to
//! an external media engine, generalised from a chat-channel adapter shape
//! to a conference room control plane.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{info, warn};

const BACKOFF_BASE_SECS: u64 = 5;
const BACKOFF_MAX_SECS: u64 = 300;
const MAX_ATTEMPTS: u32 = 10;
const JITTER_FRACTION: f64 = 0.10;
/// an engine-socket write that doesn't land within this window
/// marks the engine unreachable; it is retried after `UNREACHABLE_RETRY`.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const UNREACHABLE_RETRY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine unreachable: {0}")]
    Unreachable(String),
    #[error("engine protocol error: {0}")]
    Protocol(String),
}

/// Asynchronous event pushed back by the engine outside of a request/reply
/// round-trip (member joined/left/spoke, or the room's floor changed).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    MemberAdd { room: String, member_id: String },
    MemberDel { room: String, member_id: String },
    Talking { room: String, member_id: String, speaking: bool },
    FloorChange { room: String, member_id: String },
}

/// The media-engine control plane. One
/// instance per Voice Core process, backing a single duplex socket.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn connect(&self) -> Result<(), EngineError>;
    async fn create_room(&self, name: &str, profile: &str) -> Result<(), EngineError>;
    async fn mute(&self, room: &str, member_id: &str, muted: bool) -> Result<(), EngineError>;
    async fn kick(&self, room: &str, member_id: &str) -> Result<(), EngineError>;
    async fn hangup(&self, call_uuid: &str, reason: &str) -> Result<(), EngineError>;
    async fn list_members(&self, room: &str) -> Result<Vec<String>, EngineError>;
    fn is_connected(&self) -> bool;
}

/// `tokio_util::codec::{Framed, LinesCodec}` implementation over a single
/// TCP socket guarded by a write mutex. Asynchronous engine
/// events are split off by the reader half into `events_tx` for a
/// demultiplexer task to translate into participant-table updates.
pub struct TcpMediaEngine {
    addr: String,
    write_half: AsyncMutex<Option<Framed<TcpStream, LinesCodec>>>,
    connected: AtomicBool,
    events_tx: mpsc::Sender<EngineEvent>,
}

impl TcpMediaEngine {
    pub fn new(addr: impl Into<String>) -> (Arc<Self>, mpsc::Receiver<EngineEvent>) {
        let (events_tx, events_rx) = mpsc::channel(256);
        let engine = Arc::new(Self {
            addr: addr.into(),
            write_half: AsyncMutex::new(None),
            connected: AtomicBool::new(false),
            events_tx,
        });
        (engine, events_rx)
    }

    /// Exponential backoff with jitter (base 5s, cap 5m, 10% jitter, 10
    /// attempts) before giving up on a reconnect.
    pub async fn connect_with_backoff(self: &Arc<Self>) -> Result<(), EngineError> {
        let mut delay_secs = BACKOFF_BASE_SECS;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt == MAX_ATTEMPTS => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "media engine connect failed, backing off");
                    let jitter = jitter_secs(delay_secs);
                    tokio::time::sleep(Duration::from_secs(delay_secs + jitter)).await;
                    delay_secs = (delay_secs * 2).min(BACKOFF_MAX_SECS);
                }
            }
        }
        unreachable!("backoff loop exited without returning")
    }

    async fn send_command(&self, line: String) -> Result<String, EngineError> {
        let mut guard = self.write_half.lock().await;
        let framed = guard.as_mut().ok_or_else(|| EngineError::Unreachable(self.addr.clone()))?;
        let outcome = tokio::time::timeout(WRITE_TIMEOUT, async {
            framed.send(line).await.map_err(|e| EngineError::Protocol(e.to_string()))?;
            framed
                .next()
                .await
                .ok_or_else(|| EngineError::Protocol("engine closed connection".to_string()))?
                .map_err(|e| EngineError::Protocol(e.to_string()))
        })
        .await;
        match outcome {
            Ok(reply) => reply,
            Err(_) => {
                self.connected.store(false, Ordering::SeqCst);
                *guard = None;
                tokio::time::sleep(UNREACHABLE_RETRY).await;
                Err(EngineError::Unreachable(self.addr.clone()))
            }
        }
    }

    /// Reconciler entry point on reconnect: re-issues room creation for every
    /// still-active conference.
    pub async fn reconcile_rooms(&self, active_room_names: &[String]) {
        for room in active_room_names {
            if let Err(e) = self.create_room(room, "default").await {
                warn!(room, error = %e, "reconciler failed to recreate room");
            }
        }
    }
}

#[async_trait]
impl MediaEngine for TcpMediaEngine {
    async fn connect(&self) -> Result<(), EngineError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| EngineError::Unreachable(e.to_string()))?;
        let framed = Framed::new(stream, LinesCodec::new());
        *self.write_half.lock().await = Some(framed);
        self.connected.store(true, Ordering::SeqCst);
        info!(addr = %self.addr, "media engine connected");
        Ok(())
    }

    async fn create_room(&self, name: &str, profile: &str) -> Result<(), EngineError> {
        self.send_command(format!("CREATE_ROOM {name} {profile}")).await?;
        Ok(())
    }

    async fn mute(&self, room: &str, member_id: &str, muted: bool) -> Result<(), EngineError> {
        let flag = if muted { "on" } else { "off" };
        self.send_command(format!("MUTE {room} {member_id} {flag}")).await?;
        Ok(())
    }

    async fn kick(&self, room: &str, member_id: &str) -> Result<(), EngineError> {
        self.send_command(format!("KICK {room} {member_id}")).await?;
        Ok(())
    }

    async fn hangup(&self, call_uuid: &str, reason: &str) -> Result<(), EngineError> {
        self.send_command(format!("HANGUP {call_uuid} {reason}")).await?;
        Ok(())
    }

    async fn list_members(&self, room: &str) -> Result<Vec<String>, EngineError> {
        let reply = self.send_command(format!("LIST_MEMBERS {room}")).await?;
        Ok(reply.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

fn jitter_secs(base_secs: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let max_jitter = ((base_secs as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}

/// A `MediaEngine` that performs no I/O — used in tests and by the
/// reconciler-less unit test suite, the way `NoopPublisher` stands in for
/// `conflux_bus::Publisher`.
#[derive(Debug, Default)]
pub struct NoopMediaEngine;

#[async_trait]
impl MediaEngine for NoopMediaEngine {
    async fn connect(&self) -> Result<(), EngineError> {
        Ok(())
    }
    async fn create_room(&self, _name: &str, _profile: &str) -> Result<(), EngineError> {
        Ok(())
    }
    async fn mute(&self, _room: &str, _member_id: &str, _muted: bool) -> Result<(), EngineError> {
        Ok(())
    }
    async fn kick(&self, _room: &str, _member_id: &str) -> Result<(), EngineError> {
        Ok(())
    }
    async fn hangup(&self, _call_uuid: &str, _reason: &str) -> Result<(), EngineError> {
        Ok(())
    }
    async fn list_members(&self, _room: &str) -> Result<Vec<String>, EngineError> {
        Ok(Vec::new())
    }
    fn is_connected(&self) -> bool {
        true
    }
}
