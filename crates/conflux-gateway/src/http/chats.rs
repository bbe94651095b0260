//! `GET/POST /api/chats`, message CRUD, reactions, forwarding, threads.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use conflux_chat::{Chat, Message, NewMessage, SyncResult, Thread};
use conflux_core::types::{ChatId, ChatType, MessageId, ThreadId, UserId};
use serde::Deserialize;

use crate::app::AppState;
use crate::http::{authenticate, bad_request, error_response, parse_id, ApiError};

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_page() -> u32 {
    0
}
fn default_count() -> u32 {
    50
}

pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<PageQuery>,
) -> Result<Json<Vec<Chat>>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let chats = state
        .chat
        .list_chats_for_user(&user_id, q.page, q.count)
        .map_err(error_response)?;
    Ok(Json(chats))
}

#[derive(Deserialize)]
pub struct CreateChatRequest {
    pub name: String,
    pub chat_type: ChatType,
    pub participants: Vec<UserId>,
}

pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateChatRequest>,
) -> Result<Json<Chat>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let chat = state
        .chat
        .create_chat(&req.name, req.chat_type, user_id, &req.participants)
        .map_err(error_response)?;
    Ok(Json(chat))
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let chat_id: ChatId = parse_id(&id, "chat id")?;
    let messages = state
        .chat
        .list_messages(&chat_id, user_id, q.page, q.count)
        .map_err(error_response)?;
    Ok(Json(messages))
}

#[derive(Deserialize)]
pub struct SyncQuery {
    #[serde(default)]
    pub after_seq: i64,
    #[serde(default = "default_count")]
    pub limit: u32,
}

pub async fn sync_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(q): Query<SyncQuery>,
) -> Result<Json<SyncResult>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let chat_id: ChatId = parse_id(&id, "chat id")?;
    let result = state
        .chat
        .sync_messages(&chat_id, user_id, q.after_seq, q.limit)
        .map_err(error_response)?;
    Ok(Json(result))
}

#[derive(Deserialize, Default)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<MessageId>,
    #[serde(default)]
    pub thread_id: Option<ThreadId>,
    #[serde(default)]
    pub reply_to_ids: Vec<MessageId>,
    #[serde(default)]
    pub file_link_ids: Vec<conflux_core::types::FileLinkId>,
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let chat_id: ChatId = parse_id(&id, "chat id")?;
    if req.content.trim().is_empty() {
        return Err(bad_request("content cannot be empty"));
    }
    let new_message = NewMessage {
        content: req.content,
        parent_id: req.parent_id,
        thread_id: req.thread_id,
        reply_to_ids: req.reply_to_ids,
        file_link_ids: req.file_link_ids,
    };
    let message = state
        .chat
        .send_message(&chat_id, user_id, new_message)
        .map_err(error_response)?;
    Ok(Json(message))
}

#[derive(Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

pub async fn edit_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let message_id: MessageId = parse_id(&id, "message id")?;
    let message = state
        .chat
        .edit_message(&message_id, user_id, &req.content)
        .map_err(error_response)?;
    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let message_id: MessageId = parse_id(&id, "message id")?;
    state
        .chat
        .delete_message(&message_id, user_id)
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
    #[serde(default)]
    pub remove: bool,
}

pub async fn react_to_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ReactionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let message_id: MessageId = parse_id(&id, "message id")?;
    if req.remove {
        state
            .chat
            .remove_reaction(&message_id, user_id, &req.emoji)
            .map_err(error_response)?;
    } else {
        state
            .chat
            .add_reaction(&message_id, user_id, &req.emoji)
            .map_err(error_response)?;
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct ForwardMessageRequest {
    pub target_chat_id: ChatId,
}

pub async fn forward_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ForwardMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let message_id: MessageId = parse_id(&id, "message id")?;
    let message = state
        .chat
        .forward_message(&message_id, &req.target_chat_id, user_id)
        .map_err(error_response)?;
    Ok(Json(message))
}

#[derive(Deserialize)]
pub struct CreateThreadRequest {
    #[serde(default)]
    pub parent_message_id: Option<MessageId>,
    #[serde(default)]
    pub parent_thread_id: Option<ThreadId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub restricted_participants: bool,
}

pub async fn create_thread(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<CreateThreadRequest>,
) -> Result<Json<Thread>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let chat_id: ChatId = parse_id(&id, "chat id")?;
    let thread = state
        .chat
        .create_thread(
            &chat_id,
            user_id,
            req.parent_message_id,
            req.parent_thread_id,
            req.title,
            req.restricted_participants,
        )
        .map_err(error_response)?;
    Ok(Json(thread))
}

pub async fn archive_thread(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let thread_id: ThreadId = parse_id(&id, "thread id")?;
    state.chat.archive_thread(&thread_id, user_id).map_err(error_response)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct AddParticipantRequest {
    pub user_id: UserId,
}

pub async fn add_participant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AddParticipantRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let requester = authenticate(&state, &headers).await?;
    let chat_id: ChatId = parse_id(&id, "chat id")?;
    state
        .chat
        .add_participant(&chat_id, requester, req.user_id)
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn remove_participant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, uid)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let requester = authenticate(&state, &headers).await?;
    let chat_id: ChatId = parse_id(&id, "chat id")?;
    let target: UserId = parse_id(&uid, "user id")?;
    state
        .chat
        .remove_participant(&chat_id, requester, target)
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn mark_as_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let message_id: MessageId = parse_id(&id, "message id")?;
    state.chat.mark_as_read(&message_id, user_id).map_err(error_response)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn list_thread_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let thread_id: ThreadId = parse_id(&id, "thread id")?;
    let messages = state
        .chat
        .list_thread_messages(&thread_id, user_id)
        .map_err(error_response)?;
    Ok(Json(messages))
}
