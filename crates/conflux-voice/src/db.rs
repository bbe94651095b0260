use std::str::FromStr;

use chrono::{DateTime, Utc};
use conflux_core::types::{
    ChatId, ConferenceEventType, ConferenceId, ConferenceParticipantStatus, ConferenceRole,
    ConferenceStatus, RecurrenceFrequency, RsvpStatus, SeriesId, UserId,
};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, VoiceError};
use crate::types::{Conference, ConferenceEvent, ConferenceParticipant, ConferenceReminder, RecurrenceRule};

/// Initialise every Voice Core table. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conferences (
            id               TEXT PRIMARY KEY NOT NULL,
            name             TEXT NOT NULL,
            chat_id          TEXT,
            media_room_name  TEXT NOT NULL,
            created_by       TEXT NOT NULL,
            status           TEXT NOT NULL,
            event_type       TEXT NOT NULL,
            scheduled_at     TEXT,
            series_id        TEXT,
            max_members      INTEGER NOT NULL,
            started_at       TEXT,
            ended_at         TEXT,
            accepted_count   INTEGER NOT NULL DEFAULT 0,
            declined_count   INTEGER NOT NULL DEFAULT 0
         );
         CREATE INDEX IF NOT EXISTS idx_conferences_chat ON conferences(chat_id);
         CREATE INDEX IF NOT EXISTS idx_conferences_series ON conferences(series_id);

         CREATE TABLE IF NOT EXISTS conference_participants (
            conference_id   TEXT NOT NULL REFERENCES conferences(id),
            user_id         TEXT NOT NULL,
            status          TEXT NOT NULL,
            role            TEXT NOT NULL,
            rsvp_status     TEXT NOT NULL,
            is_muted        INTEGER NOT NULL DEFAULT 0,
            is_deaf         INTEGER NOT NULL DEFAULT 0,
            is_speaking     INTEGER NOT NULL DEFAULT 0,
            media_member_id TEXT,
            joined_at       TEXT,
            left_at         TEXT,
            PRIMARY KEY (conference_id, user_id)
         );

         CREATE TABLE IF NOT EXISTS recurrence_rules (
            conference_id    TEXT PRIMARY KEY NOT NULL REFERENCES conferences(id),
            frequency        TEXT NOT NULL,
            days_of_week     TEXT NOT NULL DEFAULT '[]',
            day_of_month     INTEGER,
            until_date       TEXT,
            occurrence_count INTEGER
         );

         CREATE TABLE IF NOT EXISTS conference_reminders (
            conference_id   TEXT NOT NULL REFERENCES conferences(id),
            user_id         TEXT NOT NULL,
            remind_at       TEXT NOT NULL,
            minutes_before  INTEGER NOT NULL,
            sent            INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (conference_id, user_id)
         );
         CREATE INDEX IF NOT EXISTS idx_reminders_due ON conference_reminders(remind_at) WHERE sent = 0;

         -- append-only moderator action log
         CREATE TABLE IF NOT EXISTS conference_events (
            id              TEXT PRIMARY KEY NOT NULL,
            conference_id   TEXT NOT NULL REFERENCES conferences(id),
            actor_id        TEXT NOT NULL,
            target_user_id  TEXT,
            action_type     TEXT NOT NULL,
            details         TEXT,
            created_at      TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_conference_events_conference ON conference_events(conference_id);
        ",
    )?;
    Ok(())
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn json_u8s(s: &str) -> Vec<u8> {
    serde_json::from_str(s).unwrap_or_default()
}

fn u8s_json(v: &[u8]) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn row_to_conference(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conference> {
    Ok(Conference {
        id: ConferenceId(row.get::<_, String>(0)?.parse().unwrap_or_default()),
        name: row.get(1)?,
        chat_id: row.get::<_, Option<String>>(2)?.and_then(|s| s.parse().ok()).map(ChatId),
        media_room_name: row.get(3)?,
        created_by: UserId(row.get::<_, String>(4)?.parse().unwrap_or_default()),
        status: ConferenceStatus::from_str(&row.get::<_, String>(5)?).unwrap_or(ConferenceStatus::Scheduled),
        event_type: ConferenceEventType::from_str(&row.get::<_, String>(6)?).unwrap_or(ConferenceEventType::Adhoc),
        scheduled_at: row.get::<_, Option<String>>(7)?.map(parse_ts),
        series_id: row.get::<_, Option<String>>(8)?.and_then(|s| s.parse().ok()).map(SeriesId),
        max_members: row.get::<_, i64>(9)? as u32,
        started_at: row.get::<_, Option<String>>(10)?.map(parse_ts),
        ended_at: row.get::<_, Option<String>>(11)?.map(parse_ts),
        accepted_count: row.get::<_, i64>(12)? as u32,
        declined_count: row.get::<_, i64>(13)? as u32,
    })
}

const CONFERENCE_SELECT: &str = "SELECT id, name, chat_id, media_room_name, created_by, status, event_type,
    scheduled_at, series_id, max_members, started_at, ended_at, accepted_count, declined_count FROM conferences";

pub(crate) fn row_to_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConferenceParticipant> {
    Ok(ConferenceParticipant {
        conference_id: ConferenceId(row.get::<_, String>(0)?.parse().unwrap_or_default()),
        user_id: UserId(row.get::<_, String>(1)?.parse().unwrap_or_default()),
        status: ConferenceParticipantStatus::from_str(&row.get::<_, String>(2)?)
            .unwrap_or(ConferenceParticipantStatus::Connecting),
        role: ConferenceRole::from_str(&row.get::<_, String>(3)?).unwrap_or(ConferenceRole::Participant),
        rsvp_status: RsvpStatus::from_str(&row.get::<_, String>(4)?).unwrap_or(RsvpStatus::Pending),
        is_muted: row.get::<_, i64>(5)? != 0,
        is_deaf: row.get::<_, i64>(6)? != 0,
        is_speaking: row.get::<_, i64>(7)? != 0,
        media_member_id: row.get(8)?,
        joined_at: row.get::<_, Option<String>>(9)?.map(parse_ts),
        left_at: row.get::<_, Option<String>>(10)?.map(parse_ts),
    })
}

const PARTICIPANT_SELECT: &str = "SELECT conference_id, user_id, status, role, rsvp_status, is_muted, is_deaf,
    is_speaking, media_member_id, joined_at, left_at FROM conference_participants";

pub fn insert_conference(conn: &Connection, c: &Conference) -> Result<()> {
    conn.execute(
        "INSERT INTO conferences (id, name, chat_id, media_room_name, created_by, status, event_type,
            scheduled_at, series_id, max_members, started_at, ended_at, accepted_count, declined_count)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
        params![
            c.id.to_string(),
            c.name,
            c.chat_id.map(|i| i.to_string()),
            c.media_room_name,
            c.created_by.to_string(),
            c.status.to_string(),
            c.event_type.to_string(),
            c.scheduled_at.map(|t| t.to_rfc3339()),
            c.series_id.map(|i| i.to_string()),
            c.max_members,
            c.started_at.map(|t| t.to_rfc3339()),
            c.ended_at.map(|t| t.to_rfc3339()),
            c.accepted_count,
            c.declined_count,
        ],
    )?;
    Ok(())
}

pub fn get_conference(conn: &Connection, id: &ConferenceId) -> Result<Option<Conference>> {
    conn.query_row(
        &format!("{CONFERENCE_SELECT} WHERE id = ?1"),
        params![id.to_string()],
        row_to_conference,
    )
    .optional()
    .map_err(VoiceError::from)
}

pub fn get_active_conference_for_chat(conn: &Connection, chat_id: &ChatId) -> Result<Option<Conference>> {
    conn.query_row(
        &format!("{CONFERENCE_SELECT} WHERE chat_id = ?1 AND status = 'active' ORDER BY started_at DESC LIMIT 1"),
        params![chat_id.to_string()],
        row_to_conference,
    )
    .optional()
    .map_err(VoiceError::from)
}

pub fn update_conference_status(
    conn: &Connection,
    id: &ConferenceId,
    status: ConferenceStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
) -> Result<()> {
    conn.execute(
        "UPDATE conferences SET status = ?1, started_at = COALESCE(?2, started_at), ended_at = COALESCE(?3, ended_at)
         WHERE id = ?4",
        params![
            status.to_string(),
            started_at.map(|t| t.to_rfc3339()),
            ended_at.map(|t| t.to_rfc3339()),
            id.to_string(),
        ],
    )?;
    Ok(())
}

pub fn update_rsvp_counts(conn: &Connection, id: &ConferenceId, accepted_delta: i64, declined_delta: i64) -> Result<()> {
    conn.execute(
        "UPDATE conferences SET accepted_count = accepted_count + ?1, declined_count = declined_count + ?2 WHERE id = ?3",
        params![accepted_delta, declined_delta, id.to_string()],
    )?;
    Ok(())
}

pub fn count_participants(conn: &Connection, id: &ConferenceId) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM conference_participants WHERE conference_id = ?1 AND status IN ('connecting','joined')",
        params![id.to_string()],
        |r| r.get(0),
    )
    .map_err(VoiceError::from)
}

pub fn insert_participant(conn: &Connection, p: &ConferenceParticipant) -> Result<()> {
    conn.execute(
        "INSERT INTO conference_participants (conference_id, user_id, status, role, rsvp_status, is_muted,
            is_deaf, is_speaking, media_member_id, joined_at, left_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
        params![
            p.conference_id.to_string(),
            p.user_id.to_string(),
            p.status.to_string(),
            p.role.to_string(),
            p.rsvp_status.to_string(),
            p.is_muted as i64,
            p.is_deaf as i64,
            p.is_speaking as i64,
            p.media_member_id,
            p.joined_at.map(|t| t.to_rfc3339()),
            p.left_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

pub fn get_participant(conn: &Connection, conference_id: &ConferenceId, user_id: &UserId) -> Result<Option<ConferenceParticipant>> {
    conn.query_row(
        &format!("{PARTICIPANT_SELECT} WHERE conference_id = ?1 AND user_id = ?2"),
        params![conference_id.to_string(), user_id.to_string()],
        row_to_participant,
    )
    .optional()
    .map_err(VoiceError::from)
}

pub fn list_participants(conn: &Connection, conference_id: &ConferenceId) -> Result<Vec<ConferenceParticipant>> {
    let mut stmt = conn.prepare(&format!("{PARTICIPANT_SELECT} WHERE conference_id = ?1"))?;
    let rows = stmt
        .query_map(params![conference_id.to_string()], row_to_participant)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn update_participant_status(
    conn: &Connection,
    conference_id: &ConferenceId,
    user_id: &UserId,
    status: ConferenceParticipantStatus,
    joined_at: Option<DateTime<Utc>>,
    left_at: Option<DateTime<Utc>>,
) -> Result<()> {
    conn.execute(
        "UPDATE conference_participants SET status = ?1, joined_at = COALESCE(?2, joined_at),
            left_at = COALESCE(?3, left_at) WHERE conference_id = ?4 AND user_id = ?5",
        params![
            status.to_string(),
            joined_at.map(|t| t.to_rfc3339()),
            left_at.map(|t| t.to_rfc3339()),
            conference_id.to_string(),
            user_id.to_string(),
        ],
    )?;
    Ok(())
}

pub fn update_participant_role(conn: &Connection, conference_id: &ConferenceId, user_id: &UserId, role: ConferenceRole) -> Result<()> {
    conn.execute(
        "UPDATE conference_participants SET role = ?1 WHERE conference_id = ?2 AND user_id = ?3",
        params![role.to_string(), conference_id.to_string(), user_id.to_string()],
    )?;
    Ok(())
}

pub fn update_participant_rsvp(conn: &Connection, conference_id: &ConferenceId, user_id: &UserId, rsvp: RsvpStatus) -> Result<()> {
    conn.execute(
        "UPDATE conference_participants SET rsvp_status = ?1 WHERE conference_id = ?2 AND user_id = ?3",
        params![rsvp.to_string(), conference_id.to_string(), user_id.to_string()],
    )?;
    Ok(())
}

pub fn update_participant_media_state(
    conn: &Connection,
    conference_id: &ConferenceId,
    user_id: &UserId,
    media_member_id: Option<&str>,
    is_muted: Option<bool>,
    is_speaking: Option<bool>,
) -> Result<()> {
    conn.execute(
        "UPDATE conference_participants SET
            media_member_id = COALESCE(?1, media_member_id),
            is_muted = COALESCE(?2, is_muted),
            is_speaking = COALESCE(?3, is_speaking)
         WHERE conference_id = ?4 AND user_id = ?5",
        params![
            media_member_id,
            is_muted.map(|b| b as i64),
            is_speaking.map(|b| b as i64),
            conference_id.to_string(),
            user_id.to_string(),
        ],
    )?;
    Ok(())
}

pub fn find_participant_by_member_id(
    conn: &Connection,
    conference_id: &ConferenceId,
    media_member_id: &str,
) -> Result<Option<ConferenceParticipant>> {
    conn.query_row(
        &format!("{PARTICIPANT_SELECT} WHERE conference_id = ?1 AND media_member_id = ?2"),
        params![conference_id.to_string(), media_member_id],
        row_to_participant,
    )
    .optional()
    .map_err(VoiceError::from)
}

pub fn insert_recurrence_rule(conn: &Connection, r: &RecurrenceRule) -> Result<()> {
    conn.execute(
        "INSERT INTO recurrence_rules (conference_id, frequency, days_of_week, day_of_month, until_date, occurrence_count)
         VALUES (?1,?2,?3,?4,?5,?6)",
        params![
            r.conference_id.to_string(),
            r.frequency.to_string(),
            u8s_json(&r.days_of_week),
            r.day_of_month,
            r.until_date.map(|t| t.to_rfc3339()),
            r.occurrence_count,
        ],
    )?;
    Ok(())
}

pub fn get_recurrence_rule(conn: &Connection, series_id: &ConferenceId) -> Result<Option<RecurrenceRule>> {
    conn.query_row(
        "SELECT conference_id, frequency, days_of_week, day_of_month, until_date, occurrence_count
         FROM recurrence_rules WHERE conference_id = ?1",
        params![series_id.to_string()],
        |row| {
            Ok(RecurrenceRule {
                conference_id: ConferenceId(row.get::<_, String>(0)?.parse().unwrap_or_default()),
                frequency: RecurrenceFrequency::from_str(&row.get::<_, String>(1)?).unwrap_or(RecurrenceFrequency::Weekly),
                days_of_week: json_u8s(&row.get::<_, String>(2)?),
                day_of_month: row.get(3)?,
                until_date: row.get::<_, Option<String>>(4)?.map(parse_ts),
                occurrence_count: row.get(5)?,
            })
        },
    )
    .optional()
    .map_err(VoiceError::from)
}

pub fn insert_reminder(conn: &Connection, r: &ConferenceReminder) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO conference_reminders (conference_id, user_id, remind_at, minutes_before, sent)
         VALUES (?1,?2,?3,?4,?5)",
        params![
            r.conference_id.to_string(),
            r.user_id.to_string(),
            r.remind_at.to_rfc3339(),
            r.minutes_before,
            r.sent as i64,
        ],
    )?;
    Ok(())
}

pub fn due_reminders(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<ConferenceReminder>> {
    let mut stmt = conn.prepare(
        "SELECT conference_id, user_id, remind_at, minutes_before, sent FROM conference_reminders
         WHERE sent = 0 AND remind_at <= ?1",
    )?;
    let rows = stmt
        .query_map(params![now.to_rfc3339()], |row| {
            Ok(ConferenceReminder {
                conference_id: ConferenceId(row.get::<_, String>(0)?.parse().unwrap_or_default()),
                user_id: UserId(row.get::<_, String>(1)?.parse().unwrap_or_default()),
                remind_at: parse_ts(row.get::<_, String>(2)?),
                minutes_before: row.get::<_, i64>(3)? as u32,
                sent: row.get::<_, i64>(4)? != 0,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Marks the reminder `sent` only if it was previously unsent — the `WHERE
/// sent = 0` guard is what makes the scanner exactly-once across racing
/// instances: `changes() == 0` means another instance
/// already claimed it.
pub fn mark_reminder_sent(conn: &Connection, conference_id: &ConferenceId, user_id: &UserId) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE conference_reminders SET sent = 1 WHERE conference_id = ?1 AND user_id = ?2 AND sent = 0",
        params![conference_id.to_string(), user_id.to_string()],
    )?;
    Ok(changed > 0)
}

pub fn insert_event(conn: &Connection, e: &ConferenceEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO conference_events (id, conference_id, actor_id, target_user_id, action_type, details, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7)",
        params![
            e.id.to_string(),
            e.conference_id.to_string(),
            e.actor_id.to_string(),
            e.target_user_id.map(|u| u.to_string()),
            e.action_type,
            e.details,
            e.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn list_events(conn: &Connection, conference_id: &ConferenceId) -> Result<Vec<ConferenceEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, conference_id, actor_id, target_user_id, action_type, details, created_at
         FROM conference_events WHERE conference_id = ?1 ORDER BY created_at ASC",
    )?;
    let rows = stmt
        .query_map(params![conference_id.to_string()], |row| {
            Ok(ConferenceEvent {
                id: row.get::<_, String>(0)?.parse().unwrap_or_default(),
                conference_id: ConferenceId(row.get::<_, String>(1)?.parse().unwrap_or_default()),
                actor_id: UserId(row.get::<_, String>(2)?.parse().unwrap_or_default()),
                target_user_id: row.get::<_, Option<String>>(3)?.and_then(|s| s.parse().ok()).map(UserId),
                action_type: row.get(4)?,
                details: row.get(5)?,
                created_at: parse_ts(row.get::<_, String>(6)?),
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn list_scheduled_conferences(conn: &Connection, before: DateTime<Utc>) -> Result<Vec<Conference>> {
    let mut stmt = conn.prepare(&format!(
        "{CONFERENCE_SELECT} WHERE status = 'scheduled' AND scheduled_at <= ?1 ORDER BY scheduled_at ASC"
    ))?;
    let rows = stmt
        .query_map(params![before.to_rfc3339()], row_to_conference)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// A materialized occurrence of `series_id` at exactly `occurrence_date`,
/// excluding the anchor row itself.
pub fn get_occurrence(conn: &Connection, series_id: &ConferenceId, occurrence_date: DateTime<Utc>) -> Result<Option<Conference>> {
    conn.query_row(
        &format!("{CONFERENCE_SELECT} WHERE series_id = ?1 AND scheduled_at = ?2 AND id != ?1"),
        params![series_id.to_string(), occurrence_date.to_rfc3339()],
        row_to_conference,
    )
    .optional()
    .map_err(VoiceError::from)
}

pub fn list_series_anchors(conn: &Connection) -> Result<Vec<Conference>> {
    let mut stmt = conn.prepare(&format!("{CONFERENCE_SELECT} WHERE event_type = 'recurring'"))?;
    let rows = stmt.query_map([], row_to_conference)?.filter_map(|r| r.ok()).collect();
    Ok(rows)
}
