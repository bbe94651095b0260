//! Call start, conference scheduling, RSVP, and role assignment.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use conflux_core::types::{ChatId, ConferenceId, ConferenceRole, RecurrenceFrequency, RsvpStatus, UserId};
use conflux_voice::{Conference, ConferenceParticipant, RecurrenceInput};
use serde::Deserialize;

use crate::app::AppState;
use crate::http::{authenticate, error_response, parse_id, ApiError};

const DEFAULT_MAX_MEMBERS: u32 = 50;

#[derive(Deserialize)]
pub struct StartCallRequest {
    #[serde(default = "default_max_members")]
    pub max_members: u32,
}

fn default_max_members() -> u32 {
    DEFAULT_MAX_MEMBERS
}

pub async fn start_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<StartCallRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let chat_id: ChatId = parse_id(&id, "chat id")?;
    let conference = state
        .voice
        .start_chat_call(&chat_id, user_id, req.max_members)
        .map_err(error_response)?;
    let credentials = state
        .voice
        .issue_media_credentials(&conference.id, &user_id)
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "conference": conference, "credentials": credentials })))
}

#[derive(Deserialize)]
pub struct RecurrenceRequest {
    pub frequency: RecurrenceFrequency,
    #[serde(default)]
    pub days_of_week: Vec<u8>,
    #[serde(default)]
    pub day_of_month: Option<u8>,
    #[serde(default)]
    pub until_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub occurrence_count: Option<u32>,
}

#[derive(Deserialize)]
pub struct ScheduleConferenceRequest {
    pub name: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceRequest>,
    #[serde(default)]
    pub participants: Vec<UserId>,
    #[serde(default = "default_max_members")]
    pub max_members: u32,
}

pub async fn schedule_conference(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ScheduleConferenceRequest>,
) -> Result<Json<Conference>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let recurrence = req.recurrence.map(|r| RecurrenceInput {
        frequency: r.frequency,
        days_of_week: r.days_of_week,
        day_of_month: r.day_of_month,
        until_date: r.until_date,
        occurrence_count: r.occurrence_count,
    });
    let conference = state
        .voice
        .schedule(
            user_id,
            &req.name,
            req.scheduled_at,
            recurrence,
            &req.participants,
            req.max_members,
        )
        .map_err(error_response)?;
    Ok(Json(conference))
}

#[derive(Deserialize)]
pub struct RsvpRequest {
    pub status: RsvpStatus,
}

pub async fn set_rsvp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RsvpRequest>,
) -> Result<Json<ConferenceParticipant>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let conference_id: ConferenceId = parse_id(&id, "conference id")?;
    let participant = state
        .voice
        .set_rsvp(&conference_id, user_id, req.status)
        .map_err(error_response)?;
    Ok(Json(participant))
}

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: ConferenceRole,
}

pub async fn set_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, uid)): Path<(String, String)>,
    Json(req): Json<SetRoleRequest>,
) -> Result<Json<ConferenceParticipant>, ApiError> {
    let actor = authenticate(&state, &headers).await?;
    let conference_id: ConferenceId = parse_id(&id, "conference id")?;
    let target: UserId = parse_id(&uid, "user id")?;
    let participant = state
        .voice
        .change_role(&conference_id, actor, target, req.role)
        .map_err(error_response)?;
    Ok(Json(participant))
}

#[derive(Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

pub async fn mute(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, uid)): Path<(String, String)>,
    Json(req): Json<MuteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = authenticate(&state, &headers).await?;
    let conference_id: ConferenceId = parse_id(&id, "conference id")?;
    let target: UserId = parse_id(&uid, "user id")?;
    state
        .voice
        .mute(&conference_id, actor, target, req.muted)
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn kick(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, uid)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = authenticate(&state, &headers).await?;
    let conference_id: ConferenceId = parse_id(&id, "conference id")?;
    let target: UserId = parse_id(&uid, "user id")?;
    state.voice.kick(&conference_id, actor, target).map_err(error_response)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = authenticate(&state, &headers).await?;
    let conference_id: ConferenceId = parse_id(&id, "conference id")?;
    state.voice.cancel(&conference_id, actor).map_err(error_response)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn end_conference(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = authenticate(&state, &headers).await?;
    let conference_id: ConferenceId = parse_id(&id, "conference id")?;
    state.voice.end_conference(&conference_id, actor).map_err(error_response)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn leave(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = authenticate(&state, &headers).await?;
    let conference_id: ConferenceId = parse_id(&id, "conference id")?;
    state.voice.leave(&conference_id, actor).map_err(error_response)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn list_participants(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<ConferenceParticipant>>, ApiError> {
    let _ = authenticate(&state, &headers).await?;
    let conference_id: ConferenceId = parse_id(&id, "conference id")?;
    let participants = state.voice.list_participants(&conference_id).map_err(error_response)?;
    Ok(Json(participants))
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<conflux_voice::ConferenceEvent>>, ApiError> {
    let _ = authenticate(&state, &headers).await?;
    let conference_id: ConferenceId = parse_id(&id, "conference id")?;
    let events = state.voice.list_events(&conference_id).map_err(error_response)?;
    Ok(Json(events))
}

#[derive(Deserialize)]
pub struct ListScheduledQuery {
    before: DateTime<Utc>,
}

pub async fn list_scheduled(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::extract::Query(q): axum::extract::Query<ListScheduledQuery>,
) -> Result<Json<Vec<Conference>>, ApiError> {
    let _ = authenticate(&state, &headers).await?;
    let conferences = state.voice.list_scheduled_conferences(q.before).map_err(error_response)?;
    Ok(Json(conferences))
}

#[derive(Deserialize)]
pub struct OccurrenceRsvpRequest {
    pub occurrence_at: DateTime<Utc>,
    pub status: RsvpStatus,
}

pub async fn rsvp_on_occurrence(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<OccurrenceRsvpRequest>,
) -> Result<Json<Conference>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let series_id: ConferenceId = parse_id(&id, "conference id")?;
    let conference = state
        .voice
        .rsvp_on_occurrence(&series_id, req.occurrence_at, user_id, req.status)
        .map_err(error_response)?;
    Ok(Json(conference))
}
