use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

use conflux_bus::{bridge::ChannelSink, BusManager};
use conflux_chat::ChatStore;
use conflux_core::{config::ConfluxConfig, types::UserId};
use conflux_files::FilesStore;
use conflux_scheduler::SchedulerHandle;
use conflux_users::UserResolver;
use conflux_voice::VoiceStore;

use crate::auth::TokenVerifier;

/// Central shared state — passed as `Arc<AppState>` to every Axum handler and
/// to the WS connection task.
pub struct AppState {
    pub config: ConfluxConfig,
    pub users: Arc<UserResolver>,
    pub files: Arc<FilesStore>,
    pub chat: Arc<ChatStore>,
    pub voice: Arc<VoiceStore>,
    pub scheduler: Arc<SchedulerHandle>,
    pub bus: Arc<BusManager>,
    pub auth: Arc<dyn TokenVerifier>,
    /// Per-user fan-out registry — a user may hold several senders, one per
    /// connected device. Filled in by `ws::connection`, drained by the
    /// bridge consumer via `ChannelSink`.
    pub ws_clients: DashMap<UserId, Vec<mpsc::Sender<String>>>,
}

#[allow(clippy::too_many_arguments)]
impl AppState {
    pub fn new(
        config: ConfluxConfig,
        users: Arc<UserResolver>,
        files: Arc<FilesStore>,
        chat: Arc<ChatStore>,
        voice: Arc<VoiceStore>,
        scheduler: Arc<SchedulerHandle>,
        bus: Arc<BusManager>,
        auth: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            config,
            users,
            files,
            chat,
            voice,
            scheduler,
            bus,
            auth,
            ws_clients: DashMap::new(),
        }
    }
}

#[async_trait::async_trait]
impl ChannelSink for AppState {
    async fn send_to_user(&self, user_id: &UserId, payload: String) {
        let Some(mut senders) = self.ws_clients.get_mut(user_id) else {
            return;
        };
        senders.retain(|tx| match tx.try_send(payload.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%user_id, "ws client send buffer full, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .route(
            "/api/chats",
            get(crate::http::chats::list_chats).post(crate::http::chats::create_chat),
        )
        .route(
            "/api/chats/{id}/messages",
            get(crate::http::chats::list_messages).post(crate::http::chats::send_message),
        )
        .route(
            "/api/chats/{id}/messages/sync",
            get(crate::http::chats::sync_messages),
        )
        .route(
            "/api/chats/messages/{id}",
            put(crate::http::chats::edit_message).delete(crate::http::chats::delete_message),
        )
        .route(
            "/api/chats/messages/{id}/reactions",
            post(crate::http::chats::react_to_message),
        )
        .route(
            "/api/chats/messages/{id}/forward",
            post(crate::http::chats::forward_message),
        )
        .route(
            "/api/chats/{id}/threads",
            post(crate::http::chats::create_thread),
        )
        .route(
            "/api/chats/threads/{id}/messages",
            get(crate::http::chats::list_thread_messages),
        )
        .route(
            "/api/chats/threads/{id}/archive",
            post(crate::http::chats::archive_thread),
        )
        .route(
            "/api/chats/{id}/participants",
            post(crate::http::chats::add_participant),
        )
        .route(
            "/api/chats/{id}/participants/{uid}",
            axum::routing::delete(crate::http::chats::remove_participant),
        )
        .route(
            "/api/chats/messages/{id}/read",
            post(crate::http::chats::mark_as_read),
        )
        .route("/api/files/upload", post(crate::http::files::upload))
        .route("/api/files/{link_id}", get(crate::http::files::download))
        .route(
            "/api/voice/chats/{id}/call/start",
            post(crate::http::voice::start_call),
        )
        .route(
            "/api/voice/conferences/schedule",
            post(crate::http::voice::schedule_conference),
        )
        .route(
            "/api/voice/conferences/{id}/rsvp",
            put(crate::http::voice::set_rsvp),
        )
        .route(
            "/api/voice/conferences/{id}/participants/{uid}/role",
            put(crate::http::voice::set_role),
        )
        .route(
            "/api/voice/conferences/{id}/participants/{uid}/mute",
            put(crate::http::voice::mute),
        )
        .route(
            "/api/voice/conferences/{id}/participants/{uid}",
            axum::routing::delete(crate::http::voice::kick),
        )
        .route(
            "/api/voice/conferences/{id}/cancel",
            post(crate::http::voice::cancel),
        )
        .route(
            "/api/voice/conferences/{id}/end",
            post(crate::http::voice::end_conference),
        )
        .route(
            "/api/voice/conferences/{id}/leave",
            post(crate::http::voice::leave),
        )
        .route(
            "/api/voice/conferences/{id}/participants",
            get(crate::http::voice::list_participants),
        )
        .route(
            "/api/voice/conferences/{id}/events",
            get(crate::http::voice::list_events),
        )
        .route(
            "/api/voice/conferences/scheduled",
            get(crate::http::voice::list_scheduled),
        )
        .route(
            "/api/voice/conferences/{id}/occurrences/rsvp",
            put(crate::http::voice::rsvp_on_occurrence),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
