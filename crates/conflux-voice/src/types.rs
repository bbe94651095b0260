use chrono::{DateTime, Utc};
use conflux_core::types::{
    ChatId, ConferenceEventType, ConferenceId, ConferenceParticipantStatus, ConferenceRole,
    ConferenceStatus, RecurrenceFrequency, RsvpStatus, SeriesId, UserId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conference {
    pub id: ConferenceId,
    pub name: String,
    pub chat_id: Option<ChatId>,
    pub media_room_name: String,
    pub created_by: UserId,
    pub status: ConferenceStatus,
    pub event_type: ConferenceEventType,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub series_id: Option<SeriesId>,
    pub max_members: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub accepted_count: u32,
    pub declined_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConferenceParticipant {
    pub conference_id: ConferenceId,
    pub user_id: UserId,
    pub status: ConferenceParticipantStatus,
    pub role: ConferenceRole,
    pub rsvp_status: RsvpStatus,
    pub is_muted: bool,
    pub is_deaf: bool,
    pub is_speaking: bool,
    pub media_member_id: Option<String>,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
}

/// Anchors a recurring series: `conference_id` points at the `event_type =
/// recurring`, `series_id = self` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub conference_id: ConferenceId,
    pub frequency: RecurrenceFrequency,
    pub days_of_week: Vec<u8>,
    pub day_of_month: Option<u8>,
    pub until_date: Option<DateTime<Utc>>,
    pub occurrence_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConferenceReminder {
    pub conference_id: ConferenceId,
    pub user_id: UserId,
    pub remind_at: DateTime<Utc>,
    pub minutes_before: u32,
    pub sent: bool,
}

/// Append-only moderator action log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConferenceEvent {
    pub id: uuid::Uuid,
    pub conference_id: ConferenceId,
    pub actor_id: UserId,
    pub target_user_id: Option<UserId>,
    pub action_type: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A future occurrence of a recurring series that has not yet been
/// materialized into a concrete `Conference` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectedOccurrence {
    pub series_id: SeriesId,
    pub occurrence_date: DateTime<Utc>,
    pub name: String,
    pub max_members: u32,
}

pub const REMINDER_MINUTES_BEFORE: u32 = 15;

/// Short-TTL media-engine login, issued per user on demand rather than
/// persisted (spec §5: "real-time credentials... issued per user on demand
/// with short TTL"). The client uses this to register directly with the
/// media engine's signaling endpoint for the room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaCredentials {
    pub login: String,
    pub password: String,
    pub room: String,
    pub expires_at: DateTime<Utc>,
}

pub const MEDIA_CREDENTIALS_TTL_SECS: i64 = 300;
