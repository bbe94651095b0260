use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use conflux_bus::{bridge::ChannelSink, BridgeConsumer, BusManager, NoopPublisher, OutboxStore, Publisher, RedisPublisher};
use conflux_chat::ChatStore;
use conflux_core::config::ConfluxConfig;
use conflux_files::FilesStore;
use conflux_protocol::frames::EventFrame;
use conflux_scheduler::SchedulerHandle;
use conflux_users::UserResolver;
use conflux_voice::{TcpMediaEngine, VoiceStore};
use rusqlite::Connection;
use tracing::{info, warn};

mod app;
mod auth;
mod http;
mod ws;

const OUTBOX_SWEEP_INTERVAL_SECS: u64 = 5;
const REMINDER_SCAN_INTERVAL_SECS: u64 = 30;
const OCCURRENCE_MATERIALIZE_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conflux_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > CONFLUX_CONFIG env > ~/.conflux/conflux.toml
    let config_path = std::env::var("CONFLUX_CONFIG").ok();
    let config = ConfluxConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        ConfluxConfig::default()
    });

    let conn = Connection::open(&config.database.path)?;
    conflux_bus::outbox::init_db(&conn)?;
    conflux_users::db::init_db(&conn)?;
    conflux_files::db::init_db(&conn)?;
    conflux_chat::db::init_db(&conn)?;
    conflux_voice::db::init_db(&conn)?;
    let conn = Arc::new(Mutex::new(conn));

    let users = Arc::new(UserResolver::new(conn.clone()));
    let files = Arc::new(FilesStore::new(conn.clone(), config.files.storage_root.clone()));

    let publisher: Arc<dyn Publisher> = if config.bus.redis_url.is_empty() {
        Arc::new(NoopPublisher)
    } else {
        match RedisPublisher::connect(&config.bus.redis_url).await {
            Ok(p) => Arc::new(p),
            Err(e) => {
                warn!("redis bus unreachable ({e}), falling back to no-op publisher");
                Arc::new(NoopPublisher)
            }
        }
    };
    let outbox = Arc::new(OutboxStore::new(conn.clone(), config.bus.outbox_max_attempts));
    let bus = Arc::new(BusManager::new(publisher, outbox));
    bus.clone().spawn_sweep_loop(OUTBOX_SWEEP_INTERVAL_SECS);

    let chat = Arc::new(ChatStore::new(conn.clone(), files.clone(), bus.clone(), users.clone()));

    let (media_engine, _engine_events) = TcpMediaEngine::new(config.media_engine.addr.clone());
    let voice = Arc::new(VoiceStore::new(conn.clone(), chat.clone(), bus.clone(), media_engine));

    let scheduler_conn = Connection::open(&config.database.path)?;
    let scheduler = Arc::new(SchedulerHandle::new(scheduler_conn)?);

    let auth = auth::build_verifier(&config.auth.mode, config.auth.jwt_secret.as_deref(), users.clone());

    let bind = config.server.bind.clone();
    let port = config.server.port;
    let redis_url = config.bus.redis_url.clone();

    let state = Arc::new(app::AppState::new(config, users, files, chat, voice.clone(), scheduler, bus, auth));

    spawn_bridge_consumer(redis_url, state.clone());
    spawn_voice_reminder_loop(voice.clone(), state.clone());
    spawn_voice_occurrence_loop(voice);

    let router = app::build_router(state.clone());

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("conflux gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Subscribes to the topic exchange and fans resolved events out to
/// per-user WS channels. Reconnects with a fixed backoff on drop — Redis
/// pub/sub offers no replay, so a dropped connection only loses events for
/// the gap, which the outbox/sweep path does not cover.
fn spawn_bridge_consumer(redis_url: String, state: Arc<app::AppState>) {
    tokio::spawn(async move {
        let consumer = BridgeConsumer::new(redis_url);
        loop {
            if let Err(e) = consumer.run(state.as_ref() as &dyn ChannelSink).await {
                warn!(error = %e, "bridge consumer dropped, reconnecting in 5s");
            }
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        }
    });
}

/// The reminder-scanner scheduled job: claims due reminders and
/// delivers them straight to each recipient's WS channel. There is no
/// durable queue for reminders — a disconnected client simply misses it.
fn spawn_voice_reminder_loop(voice: Arc<VoiceStore>, state: Arc<app::AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(REMINDER_SCAN_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let now = chrono::Utc::now();
            match voice.scan_due_reminders(now) {
                Ok(due) => {
                    for (conference_id, user_id, minutes_before) in due {
                        let frame = EventFrame::new(
                            "conference.reminder",
                            serde_json::json!({ "conference_id": conference_id, "minutes_before": minutes_before }),
                        );
                        if let Ok(payload) = serde_json::to_string(&frame) {
                            state.send_to_user(&user_id, payload).await;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "reminder scan failed"),
            }
        }
    });
}

/// The occurrence-materializer scheduled job: projects recurring
/// series forward so reminders can be scheduled ahead of the next occurrence.
fn spawn_voice_occurrence_loop(voice: Arc<VoiceStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(OCCURRENCE_MATERIALIZE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if let Err(e) = voice.materialize_due_occurrences(chrono::Utc::now()) {
                warn!(error = %e, "occurrence materialization failed");
            }
        }
    });
}
