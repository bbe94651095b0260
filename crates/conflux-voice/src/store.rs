use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use conflux_bus::BusManager;
use conflux_chat::ChatStore;
use conflux_core::types::{
    ChatId, ConferenceEventType, ConferenceId, ConferenceParticipantStatus, ConferenceRole,
    ConferenceStatus, RecurrenceFrequency, RsvpStatus, SeriesId, UserId,
};
use conflux_protocol::frames::{EventEnvelope, RoutingKey};
use rusqlite::Connection;
use serde_json::json;
use tracing::instrument;

use crate::db;
use crate::error::{Result, VoiceError};
use crate::media_engine::MediaEngine;
use crate::recurrence;
use crate::types::{
    Conference, ConferenceEvent, ConferenceParticipant, ConferenceReminder, MediaCredentials,
    RecurrenceRule, MEDIA_CREDENTIALS_TTL_SECS, REMINDER_MINUTES_BEFORE,
};

/// Input to `schedule` describing the recurrence, if any.
#[derive(Debug, Clone)]
pub struct RecurrenceInput {
    pub frequency: RecurrenceFrequency,
    pub days_of_week: Vec<u8>,
    pub day_of_month: Option<u8>,
    pub until_date: Option<DateTime<Utc>>,
    pub occurrence_count: Option<u32>,
}

/// Voice Core: ad-hoc and scheduled conferences, participants, RSVPs,
/// recurrence, moderator actions, reminders. Shares the same
/// connection as Chat Core so `CreateAdHocFromChat`'s participant admission
/// and main-chat system message land in one transaction scope.
pub struct VoiceStore {
    conn: Arc<Mutex<Connection>>,
    chat: Arc<ChatStore>,
    bus: Arc<BusManager>,
    engine: Arc<dyn MediaEngine>,
}

impl VoiceStore {
    pub fn new(conn: Arc<Mutex<Connection>>, chat: Arc<ChatStore>, bus: Arc<BusManager>, engine: Arc<dyn MediaEngine>) -> Self {
        Self { conn, chat, bus, engine }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("voice connection poisoned")
    }

    fn require_participant(&self, conn: &Connection, conference_id: &ConferenceId, user_id: &UserId) -> Result<ConferenceParticipant> {
        db::get_participant(conn, conference_id, user_id)?
            .ok_or_else(|| VoiceError::PermissionDenied(format!("{user_id} is not a participant of {conference_id}")))
    }

    fn require_conference(&self, conn: &Connection, conference_id: &ConferenceId) -> Result<Conference> {
        db::get_conference(conn, conference_id)?.ok_or_else(|| VoiceError::NotFound(conference_id.to_string()))
    }

    fn room_name(conference_id: &ConferenceId) -> String {
        format!("conf-{conference_id}")
    }

    fn log_event(&self, conn: &Connection, conference_id: &ConferenceId, actor_id: UserId, target_user_id: Option<UserId>, action_type: &str, details: Option<String>) -> Result<()> {
        db::insert_event(
            conn,
            &ConferenceEvent {
                id: uuid::Uuid::now_v7(),
                conference_id: *conference_id,
                actor_id,
                target_user_id,
                action_type: action_type.to_string(),
                details,
                created_at: Utc::now(),
            },
        )
    }

    /// `CreateAdhoc(creator, name, participants, max_members)` — originator
    /// joins immediately, invitees start `connecting`/`pending`.
    #[instrument(skip(self, participant_ids))]
    pub fn create_adhoc(&self, creator: UserId, name: &str, participant_ids: &[UserId], max_members: u32) -> Result<Conference> {
        let now = Utc::now();
        let id = ConferenceId::new();
        let conference = Conference {
            id,
            name: name.to_string(),
            chat_id: None,
            media_room_name: Self::room_name(&id),
            created_by: creator,
            status: ConferenceStatus::Active,
            event_type: ConferenceEventType::Adhoc,
            scheduled_at: None,
            series_id: None,
            max_members,
            started_at: Some(now),
            ended_at: None,
            accepted_count: 1,
            declined_count: 0,
        };

        {
            let conn = self.lock();
            db::insert_conference(&conn, &conference)?;
            self.admit(&conn, &conference, creator, ConferenceRole::Originator, true, now)?;
            for &user_id in participant_ids {
                if user_id == creator {
                    continue;
                }
                self.admit(&conn, &conference, user_id, ConferenceRole::Participant, false, now)?;
            }
        }

        self.create_room_best_effort(&conference.media_room_name);
        self.publish(RoutingKey::ConferenceCreated, creator, self.all_participant_ids(&conference.id)?, conference.chat_id, Some(conference.id), json!({ "conference_id": conference.id }));
        Ok(conference)
    }

    fn admit(&self, conn: &Connection, conference: &Conference, user_id: UserId, role: ConferenceRole, joined: bool, now: DateTime<Utc>) -> Result<()> {
        db::insert_participant(
            conn,
            &ConferenceParticipant {
                conference_id: conference.id,
                user_id,
                status: if joined { ConferenceParticipantStatus::Joined } else { ConferenceParticipantStatus::Connecting },
                role,
                rsvp_status: if joined { RsvpStatus::Accepted } else { RsvpStatus::Pending },
                is_muted: false,
                is_deaf: false,
                is_speaking: false,
                media_member_id: None,
                joined_at: if joined { Some(now) } else { None },
                left_at: None,
            },
        )
    }

    fn all_participant_ids(&self, conference_id: &ConferenceId) -> Result<Vec<UserId>> {
        let conn = self.lock();
        Ok(db::list_participants(&conn, conference_id)?.into_iter().map(|p| p.user_id).collect())
    }

    fn create_room_best_effort(&self, room_name: &str) {
        let engine = self.engine.clone();
        let room_name = room_name.to_string();
        tokio::spawn(async move {
            if let Err(e) = engine.create_room(&room_name, "default").await {
                tracing::warn!(error = %e, room = %room_name, "media engine failed to create room");
            }
        });
    }

    /// `CreateAdHocFromChat(chat, actor, participants, max_members)` —
    /// requires `actor` be a chat member; defaults to every chat member when
    /// `participant_ids` is `None`; emits the main-chat system notice in
    /// addition to `conference.created`.
    #[instrument(skip(self, participant_ids))]
    pub fn create_adhoc_from_chat(&self, chat_id: &ChatId, actor: UserId, participant_ids: Option<Vec<UserId>>, max_members: u32) -> Result<Conference> {
        {
            let conn = self.lock();
            conflux_chat::db::get_participant(&conn, chat_id, &actor)?
                .ok_or_else(|| VoiceError::PermissionDenied(format!("{actor} is not a participant of {chat_id}")))?;
        }
        let invitees = match participant_ids {
            Some(ids) => ids,
            None => {
                let conn = self.lock();
                conflux_chat::db::list_participants(&conn, chat_id)?
                    .into_iter()
                    .map(|p| p.user_id)
                    .filter(|&id| id != actor)
                    .collect()
            }
        };

        let now = Utc::now();
        let id = ConferenceId::new();
        let conference = Conference {
            id,
            name: "Call".to_string(),
            chat_id: Some(*chat_id),
            media_room_name: Self::room_name(&id),
            created_by: actor,
            status: ConferenceStatus::Active,
            event_type: ConferenceEventType::AdhocChat,
            scheduled_at: None,
            series_id: None,
            max_members,
            started_at: Some(now),
            ended_at: None,
            accepted_count: 1,
            declined_count: 0,
        };

        {
            let conn = self.lock();
            db::insert_conference(&conn, &conference)?;
            self.admit(&conn, &conference, actor, ConferenceRole::Originator, true, now)?;
            for &user_id in &invitees {
                self.admit(&conn, &conference, user_id, ConferenceRole::Participant, false, now)?;
            }
        }

        self.create_room_best_effort(&conference.media_room_name);
        self.chat.send_system_message(chat_id, "started a call", true)?;
        self.publish(RoutingKey::ConferenceCreated, actor, self.all_participant_ids(&conference.id)?, conference.chat_id, Some(conference.id), json!({ "conference_id": conference.id }));
        Ok(conference)
    }

    /// `StartChatCall` — idempotent: joins the chat's already-active
    /// conference if one exists, otherwise creates one.
    #[instrument(skip(self))]
    pub fn start_chat_call(&self, chat_id: &ChatId, actor: UserId, max_members: u32) -> Result<Conference> {
        let existing = {
            let conn = self.lock();
            db::get_active_conference_for_chat(&conn, chat_id)?
        };
        match existing {
            Some(conference) => {
                self.join(&conference.id, actor)?;
                self.require_conference(&self.lock(), &conference.id)
            }
            None => self.create_adhoc_from_chat(chat_id, actor, None, max_members),
        }
    }

    /// `Join(conference, actor)` — transitions `scheduled` to `active` on the
    /// first join at or after `scheduled_at`; `max_members` is enforced
    /// inside the same lock scope as the participant insert, so the
    /// `max_members + 1`'th concurrent join fails with `conflict`.
    #[instrument(skip(self))]
    pub fn join(&self, conference_id: &ConferenceId, actor: UserId) -> Result<ConferenceParticipant> {
        let now = Utc::now();
        let (participant, newly_active) = {
            let conn = self.lock();
            let conference = self.require_conference(&conn, conference_id)?;
            if matches!(conference.status, ConferenceStatus::Ended | ConferenceStatus::Cancelled) {
                return Err(VoiceError::PreconditionFailed(format!("{conference_id} has already ended")));
            }

            let existing = db::get_participant(&conn, conference_id, &actor)?;
            // a pre-invited participant already reserved a slot when admitted;
            // only a brand-new joiner can push the room past max_members.
            if existing.is_none() {
                let occupied = db::count_participants(&conn, conference_id)?;
                if occupied as u32 >= conference.max_members {
                    return Err(VoiceError::Conflict(format!("{conference_id} is at max_members")));
                }
            }

            let was_accepted = existing.as_ref().is_some_and(|p| p.rsvp_status == RsvpStatus::Accepted);
            match existing {
                Some(_) => {
                    db::update_participant_status(&conn, conference_id, &actor, ConferenceParticipantStatus::Joined, Some(now), None)?;
                    db::update_participant_rsvp(&conn, conference_id, &actor, RsvpStatus::Accepted)?;
                }
                None => {
                    self.admit(&conn, &conference, actor, ConferenceRole::Participant, true, now)?;
                }
            }
            if !was_accepted {
                db::update_rsvp_counts(&conn, conference_id, 1, 0)?;
            }

            let newly_active = conference.status == ConferenceStatus::Scheduled;
            if newly_active {
                db::update_conference_status(&conn, conference_id, ConferenceStatus::Active, Some(now), None)?;
            }

            (self.require_participant(&conn, conference_id, &actor)?, newly_active)
        };

        if newly_active {
            self.create_room_best_effort(&Self::room_name(conference_id));
        }
        self.publish(RoutingKey::ParticipantJoined, actor, self.all_participant_ids(conference_id)?, None, Some(*conference_id), json!({ "user_id": actor }));
        Ok(participant)
    }

    /// `Leave(conference, actor)` — the last participant leaving ends the
    /// conference→ ended`).
    #[instrument(skip(self))]
    pub fn leave(&self, conference_id: &ConferenceId, actor: UserId) -> Result<()> {
        let now = Utc::now();
        let ended = {
            let conn = self.lock();
            self.require_participant(&conn, conference_id, &actor)?;
            db::update_participant_status(&conn, conference_id, &actor, ConferenceParticipantStatus::Left, None, Some(now))?;
            db::count_participants(&conn, conference_id)? == 0
        };
        if ended {
            let conn = self.lock();
            db::update_conference_status(&conn, conference_id, ConferenceStatus::Ended, None, Some(now))?;
        }
        self.hangup_best_effort(conference_id, ended, "last participant left");
        self.publish(RoutingKey::ParticipantLeft, actor, self.all_participant_ids(conference_id)?, None, Some(*conference_id), json!({ "user_id": actor }));
        if ended {
            self.publish(RoutingKey::ConferenceEnded, actor, Vec::new(), None, Some(*conference_id), json!({}));
        }
        Ok(())
    }

    fn hangup_best_effort(&self, conference_id: &ConferenceId, should: bool, reason: &str) {
        if !should {
            return;
        }
        let engine = self.engine.clone();
        let conference_id = conference_id.to_string();
        let reason = reason.to_string();
        tokio::spawn(async move {
            if let Err(e) = engine.hangup(&conference_id, &reason).await {
                tracing::warn!(error = %e, conference_id, "media engine failed to hang up");
            }
        });
    }

    /// `EndConference` — only the originator may end it directly (spec
    /// §4.3 state machine `active →(originator EndConference)→ ended`).
    #[instrument(skip(self))]
    pub fn end_conference(&self, conference_id: &ConferenceId, actor: UserId) -> Result<()> {
        let now = Utc::now();
        {
            let conn = self.lock();
            let participant = self.require_participant(&conn, conference_id, &actor)?;
            if participant.role != ConferenceRole::Originator {
                return Err(VoiceError::PermissionDenied(format!("{actor} is not the originator of {conference_id}")));
            }
            db::update_conference_status(&conn, conference_id, ConferenceStatus::Ended, None, Some(now))?;
            self.log_event(&conn, conference_id, actor, None, "end_conference", None)?;
        }
        self.hangup_best_effort(conference_id, true, "originator ended the conference");
        self.publish(RoutingKey::ConferenceEnded, actor, self.all_participant_ids(conference_id)?, None, Some(*conference_id), json!({}));
        Ok(())
    }

    /// `Cancel` — only a `scheduled` conference may be cancelled, only by its
    /// originator→ cancelled`).
    #[instrument(skip(self))]
    pub fn cancel(&self, conference_id: &ConferenceId, actor: UserId) -> Result<()> {
        {
            let conn = self.lock();
            let conference = self.require_conference(&conn, conference_id)?;
            if conference.status != ConferenceStatus::Scheduled {
                return Err(VoiceError::PreconditionFailed(format!("{conference_id} is not scheduled")));
            }
            let participant = self.require_participant(&conn, conference_id, &actor)?;
            if participant.role != ConferenceRole::Originator {
                return Err(VoiceError::PermissionDenied(format!("{actor} is not the originator of {conference_id}")));
            }
            self.log_event(&conn, conference_id, actor, None, "cancel", None)?;
            db::update_conference_status(&conn, conference_id, ConferenceStatus::Cancelled, None, None)?;
        }
        self.publish(RoutingKey::ConferenceCancelled, actor, self.all_participant_ids(conference_id)?, None, Some(*conference_id), json!({}));
        Ok(())
    }

    /// The `CanChangeRole` matrix: the originator can assign anything; a moderator can
    /// move another participant/speaker/assistant to any of those three
    /// roles, but can never touch or assign `originator`/`moderator`.
    pub fn can_change_role(actor_role: ConferenceRole, target_current: ConferenceRole, target_new: ConferenceRole) -> bool {
        match actor_role {
            ConferenceRole::Originator => true,
            ConferenceRole::Moderator => {
                let restricted = |r: ConferenceRole| matches!(r, ConferenceRole::Originator | ConferenceRole::Moderator);
                !restricted(target_current) && !restricted(target_new)
            }
            _ => false,
        }
    }

    /// `ChangeRole(conference, actor, target, new_role)`.
    #[instrument(skip(self))]
    pub fn change_role(&self, conference_id: &ConferenceId, actor: UserId, target: UserId, new_role: ConferenceRole) -> Result<ConferenceParticipant> {
        {
            let conn = self.lock();
            let actor_p = self.require_participant(&conn, conference_id, &actor)?;
            let target_p = self.require_participant(&conn, conference_id, &target)?;
            if !Self::can_change_role(actor_p.role, target_p.role, new_role) {
                return Err(VoiceError::PermissionDenied(format!("{actor} cannot change {target}'s role to {new_role}")));
            }
            db::update_participant_role(&conn, conference_id, &target, new_role)?;
            self.log_event(&conn, conference_id, actor, Some(target), "role_change", Some(new_role.to_string()))?;
        }
        let participant = { let conn = self.lock(); self.require_participant(&conn, conference_id, &target)? };
        self.publish(RoutingKey::RoleChanged, actor, self.all_participant_ids(conference_id)?, None, Some(*conference_id), json!({ "user_id": target, "role": new_role.to_string() }));
        Ok(participant)
    }

    fn require_moderator_or_originator(&self, conn: &Connection, conference_id: &ConferenceId, actor: UserId) -> Result<ConferenceRole> {
        let actor_p = self.require_participant(conn, conference_id, &actor)?;
        if !matches!(actor_p.role, ConferenceRole::Originator | ConferenceRole::Moderator) {
            return Err(VoiceError::PermissionDenied(format!("{actor} is not a moderator of {conference_id}")));
        }
        Ok(actor_p.role)
    }

    /// `Mute(conference, actor, target, muted)` — a moderator or the
    /// originator may mute anyone; a participant may only mute themselves
    ///.
    #[instrument(skip(self))]
    pub fn mute(&self, conference_id: &ConferenceId, actor: UserId, target: UserId, muted: bool) -> Result<()> {
        let media_member_id = {
            let conn = self.lock();
            if actor != target {
                self.require_moderator_or_originator(&conn, conference_id, actor)?;
            } else {
                self.require_participant(&conn, conference_id, &actor)?;
            }
            let target_p = self.require_participant(&conn, conference_id, &target)?;
            db::update_participant_media_state(&conn, conference_id, &target, None, Some(muted), None)?;
            self.log_event(&conn, conference_id, actor, Some(target), "mute", Some(muted.to_string()))?;
            target_p.media_member_id
        };
        if let Some(member_id) = media_member_id {
            let engine = self.engine.clone();
            let room = Self::room_name(conference_id);
            tokio::spawn(async move {
                if let Err(e) = engine.mute(&room, &member_id, muted).await {
                    tracing::warn!(error = %e, room, "media engine failed to mute participant");
                }
            });
        }
        self.publish(RoutingKey::ParticipantMuted, actor, self.all_participant_ids(conference_id)?, None, Some(*conference_id), json!({ "user_id": target, "muted": muted }));
        Ok(())
    }

    /// `Kick(conference, actor, target)` — a moderator may never kick the
    /// originator or another moderator (mirrors the `CanChangeRole`
    /// restriction).
    #[instrument(skip(self))]
    pub fn kick(&self, conference_id: &ConferenceId, actor: UserId, target: UserId) -> Result<()> {
        let now = Utc::now();
        let (media_member_id, ended) = {
            let conn = self.lock();
            let actor_role = self.require_moderator_or_originator(&conn, conference_id, actor)?;
            let target_p = self.require_participant(&conn, conference_id, &target)?;
            if actor_role == ConferenceRole::Moderator && matches!(target_p.role, ConferenceRole::Originator | ConferenceRole::Moderator) {
                return Err(VoiceError::PermissionDenied(format!("{actor} cannot kick {target}")));
            }
            db::update_participant_status(&conn, conference_id, &target, ConferenceParticipantStatus::Kicked, None, Some(now))?;
            self.log_event(&conn, conference_id, actor, Some(target), "kick", None)?;
            let ended = db::count_participants(&conn, conference_id)? == 0;
            if ended {
                db::update_conference_status(&conn, conference_id, ConferenceStatus::Ended, None, Some(now))?;
            }
            (target_p.media_member_id, ended)
        };
        if let Some(member_id) = media_member_id {
            let engine = self.engine.clone();
            let room = Self::room_name(conference_id);
            tokio::spawn(async move {
                if let Err(e) = engine.kick(&room, &member_id).await {
                    tracing::warn!(error = %e, room, "media engine failed to kick participant");
                }
            });
        }
        self.hangup_best_effort(conference_id, ended, "last participant kicked");
        self.publish(RoutingKey::ParticipantRemoved, actor, self.all_participant_ids(conference_id)?, None, Some(*conference_id), json!({ "user_id": target }));
        if ended {
            self.publish(RoutingKey::ConferenceEnded, actor, Vec::new(), None, Some(*conference_id), json!({}));
        }
        Ok(())
    }

    /// `SetRsvp(conference, actor, status)`.
    #[instrument(skip(self))]
    pub fn set_rsvp(&self, conference_id: &ConferenceId, actor: UserId, status: RsvpStatus) -> Result<ConferenceParticipant> {
        let participant = {
            let conn = self.lock();
            let current = self.require_participant(&conn, conference_id, &actor)?;
            let (accepted_delta, declined_delta) = rsvp_count_deltas(current.rsvp_status, status);
            db::update_participant_rsvp(&conn, conference_id, &actor, status)?;
            if accepted_delta != 0 || declined_delta != 0 {
                db::update_rsvp_counts(&conn, conference_id, accepted_delta, declined_delta)?;
            }
            self.require_participant(&conn, conference_id, &actor)?
        };
        self.publish(RoutingKey::RsvpUpdated, actor, self.all_participant_ids(conference_id)?, None, Some(*conference_id), json!({ "user_id": actor, "status": status.to_string() }));
        Ok(participant)
    }

    /// `Schedule(creator, name, scheduled_at, recurrence, participants,
    /// max_members)` — schedules a per-invitee reminder at `scheduled_at -
    /// 15min`.
    #[instrument(skip(self, participant_ids))]
    pub fn schedule(
        &self,
        creator: UserId,
        name: &str,
        scheduled_at: DateTime<Utc>,
        recurrence: Option<RecurrenceInput>,
        participant_ids: &[UserId],
        max_members: u32,
    ) -> Result<Conference> {
        let conference_id = ConferenceId::new();
        let is_recurring = recurrence.is_some();
        let conference = Conference {
            id: conference_id,
            name: name.to_string(),
            chat_id: None,
            media_room_name: Self::room_name(&conference_id),
            created_by: creator,
            status: ConferenceStatus::Scheduled,
            event_type: if is_recurring { ConferenceEventType::Recurring } else { ConferenceEventType::Scheduled },
            scheduled_at: Some(scheduled_at),
            series_id: if is_recurring { Some(SeriesId(conference_id.0)) } else { None },
            max_members,
            started_at: None,
            ended_at: None,
            accepted_count: 1,
            declined_count: 0,
        };

        {
            let conn = self.lock();
            db::insert_conference(&conn, &conference)?;
            let now = Utc::now();
            db::insert_participant(
                &conn,
                &ConferenceParticipant {
                    conference_id,
                    user_id: creator,
                    status: ConferenceParticipantStatus::Connecting,
                    role: ConferenceRole::Originator,
                    rsvp_status: RsvpStatus::Accepted,
                    is_muted: false,
                    is_deaf: false,
                    is_speaking: false,
                    media_member_id: None,
                    joined_at: None,
                    left_at: None,
                },
            )?;
            for &user_id in participant_ids {
                if user_id == creator {
                    continue;
                }
                db::insert_participant(
                    &conn,
                    &ConferenceParticipant {
                        conference_id,
                        user_id,
                        status: ConferenceParticipantStatus::Connecting,
                        role: ConferenceRole::Participant,
                        rsvp_status: RsvpStatus::Pending,
                        is_muted: false,
                        is_deaf: false,
                        is_speaking: false,
                        media_member_id: None,
                        joined_at: None,
                        left_at: None,
                    },
                )?;
            }
            if let Some(r) = &recurrence {
                db::insert_recurrence_rule(
                    &conn,
                    &RecurrenceRule {
                        conference_id,
                        frequency: r.frequency,
                        days_of_week: r.days_of_week.clone(),
                        day_of_month: r.day_of_month,
                        until_date: r.until_date,
                        occurrence_count: r.occurrence_count,
                    },
                )?;
            }
            self.schedule_reminders(&conn, &conference, participant_ids, creator, now)?;
        }

        self.publish(RoutingKey::ConferenceScheduled, creator, self.all_participant_ids(&conference_id)?, None, Some(conference_id), json!({ "conference_id": conference_id, "scheduled_at": scheduled_at }));
        Ok(conference)
    }

    fn schedule_reminders(&self, conn: &Connection, conference: &Conference, participant_ids: &[UserId], creator: UserId, _now: DateTime<Utc>) -> Result<()> {
        let Some(scheduled_at) = conference.scheduled_at else { return Ok(()) };
        let remind_at = scheduled_at - chrono::Duration::minutes(REMINDER_MINUTES_BEFORE as i64);
        let invitees = std::iter::once(creator).chain(participant_ids.iter().copied().filter(|&id| id != creator));
        for user_id in invitees {
            db::insert_reminder(
                conn,
                &ConferenceReminder { conference_id: conference.id, user_id, remind_at, minutes_before: REMINDER_MINUTES_BEFORE, sent: false },
            )?;
        }
        Ok(())
    }

    /// Materializes `series_id`'s occurrence at `occurrence_at` into a
    /// concrete `Conference` row if it doesn't already exist, copying the
    /// anchor's invitee list and scheduling their reminders.
    fn materialize_occurrence_locked(&self, conn: &Connection, anchor: &Conference, occurrence_at: DateTime<Utc>) -> Result<Conference> {
        if let Some(existing) = db::get_occurrence(conn, &anchor.id, occurrence_at)? {
            return Ok(existing);
        }

        let occurrence_id = ConferenceId::new();
        let occurrence = Conference {
            id: occurrence_id,
            name: anchor.name.clone(),
            chat_id: anchor.chat_id,
            media_room_name: Self::room_name(&occurrence_id),
            created_by: anchor.created_by,
            status: ConferenceStatus::Scheduled,
            event_type: ConferenceEventType::Recurring,
            scheduled_at: Some(occurrence_at),
            series_id: Some(SeriesId(anchor.id.0)),
            max_members: anchor.max_members,
            started_at: None,
            ended_at: None,
            accepted_count: 0,
            declined_count: 0,
        };
        db::insert_conference(conn, &occurrence)?;

        let invitees = db::list_participants(conn, &anchor.id)?;
        for invitee in &invitees {
            db::insert_participant(
                conn,
                &ConferenceParticipant {
                    conference_id: occurrence_id,
                    user_id: invitee.user_id,
                    status: ConferenceParticipantStatus::Connecting,
                    role: if invitee.user_id == anchor.created_by { ConferenceRole::Originator } else { ConferenceRole::Participant },
                    rsvp_status: RsvpStatus::Pending,
                    is_muted: false,
                    is_deaf: false,
                    is_speaking: false,
                    media_member_id: None,
                    joined_at: None,
                    left_at: None,
                },
            )?;
        }
        let remind_at = occurrence_at - chrono::Duration::minutes(REMINDER_MINUTES_BEFORE as i64);
        for invitee in &invitees {
            db::insert_reminder(
                conn,
                &ConferenceReminder { conference_id: occurrence_id, user_id: invitee.user_id, remind_at, minutes_before: REMINDER_MINUTES_BEFORE, sent: false },
            )?;
        }
        Ok(occurrence)
    }

    /// `RsvpOnOccurrence(series, occurrence_date, actor, status)` — the entry
    /// point that triggers lazy materialization the first time anyone
    /// touches a not-yet-concrete future occurrence.
    #[instrument(skip(self))]
    pub fn rsvp_on_occurrence(&self, series_id: &ConferenceId, occurrence_at: DateTime<Utc>, actor: UserId, status: RsvpStatus) -> Result<Conference> {
        let conference = {
            let conn = self.lock();
            let anchor = self.require_conference(&conn, series_id)?;
            db::get_recurrence_rule(&conn, series_id)?
                .ok_or_else(|| VoiceError::InvalidArgument(format!("{series_id} is not a recurring series")))?;
            self.materialize_occurrence_locked(&conn, &anchor, occurrence_at)?
        };
        self.set_rsvp(&conference.id, actor, status)?;
        let conn = self.lock();
        self.require_conference(&conn, &conference.id)
    }

    /// The occurrence-materializer scheduled job: projects every recurring
    /// series up to `now + REMINDER_MINUTES_BEFORE` and materializes any date
    /// that isn't a concrete row yet, so its reminder can be scheduled in
    /// time.
    #[instrument(skip(self))]
    pub fn materialize_due_occurrences(&self, now: DateTime<Utc>) -> Result<Vec<Conference>> {
        let horizon = now + chrono::Duration::minutes(REMINDER_MINUTES_BEFORE as i64);
        let conn = self.lock();
        let anchors = db::list_series_anchors(&conn)?;
        let mut materialized = Vec::new();
        for anchor in anchors {
            let Some(anchor_at) = anchor.scheduled_at else { continue };
            let Some(rule) = db::get_recurrence_rule(&conn, &anchor.id)? else { continue };
            for occurrence_at in recurrence::occurrences_until(&rule, anchor_at, horizon) {
                if occurrence_at <= anchor_at {
                    continue;
                }
                materialized.push(self.materialize_occurrence_locked(&conn, &anchor, occurrence_at)?);
            }
        }
        Ok(materialized)
    }

    /// The reminder-scanner scheduled job: claims every due, unsent reminder
    /// exactly once via `db::mark_reminder_sent`'s `WHERE sent = 0` guard
    ///. No bus event is published — there is no reminder routing
    /// key; the caller is responsible for delivery.
    #[instrument(skip(self))]
    pub fn scan_due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<(ConferenceId, UserId, u32)>> {
        let conn = self.lock();
        let due = db::due_reminders(&conn, now)?;
        let mut claimed = Vec::with_capacity(due.len());
        for reminder in due {
            if db::mark_reminder_sent(&conn, &reminder.conference_id, &reminder.user_id)? {
                claimed.push((reminder.conference_id, reminder.user_id, reminder.minutes_before));
            }
        }
        Ok(claimed)
    }

    /// Issues fresh media-engine (verto) credentials for `user_id` to join
    /// `conference_id`'s room — generated on demand and never persisted;
    /// the caller must already be a participant.
    #[instrument(skip(self))]
    pub fn issue_media_credentials(&self, conference_id: &ConferenceId, user_id: &UserId) -> Result<MediaCredentials> {
        let conn = self.lock();
        let conference = self.require_conference(&conn, conference_id)?;
        self.require_participant(&conn, conference_id, user_id)?;
        Ok(MediaCredentials {
            login: format!("{user_id}@{}", conference.media_room_name),
            password: uuid::Uuid::new_v4().to_string(),
            room: conference.media_room_name,
            expires_at: Utc::now() + chrono::Duration::seconds(MEDIA_CREDENTIALS_TTL_SECS),
        })
    }

    pub fn get_conference(&self, conference_id: &ConferenceId) -> Result<Conference> {
        let conn = self.lock();
        self.require_conference(&conn, conference_id)
    }

    pub fn list_participants(&self, conference_id: &ConferenceId) -> Result<Vec<ConferenceParticipant>> {
        let conn = self.lock();
        db::list_participants(&conn, conference_id)
    }

    pub fn list_events(&self, conference_id: &ConferenceId) -> Result<Vec<ConferenceEvent>> {
        let conn = self.lock();
        db::list_events(&conn, conference_id)
    }

    pub fn list_scheduled_conferences(&self, before: DateTime<Utc>) -> Result<Vec<Conference>> {
        let conn = self.lock();
        db::list_scheduled_conferences(&conn, before)
    }

    fn publish(
        &self,
        routing_key: RoutingKey,
        actor_id: UserId,
        participants: Vec<UserId>,
        chat_id: Option<ChatId>,
        conference_id: Option<ConferenceId>,
        data: serde_json::Value,
    ) {
        let mut envelope = EventEnvelope::new(routing_key, actor_id, participants, data);
        if let Some(chat_id) = chat_id {
            envelope = envelope.with_chat_id(chat_id.to_string());
        }
        if let Some(conference_id) = conference_id {
            envelope = envelope.with_conference_id(conference_id.to_string());
        }
        let bus = self.bus.clone();
        let routing_key_str = routing_key.to_string();
        tokio::spawn(async move {
            if let Err(e) = bus.publish_durable(&routing_key_str, &envelope).await {
                tracing::warn!(error = %e, "failed to enqueue domain event");
            }
        });
    }
}

/// `pending→accepted` increments `accepted_count`; `pending→declined`
/// increments `declined_count`; an `accepted→declined` flip (or the reverse)
/// moves one unit between them.
fn rsvp_count_deltas(from: RsvpStatus, to: RsvpStatus) -> (i64, i64) {
    if from == to {
        return (0, 0);
    }
    let was_accepted = from == RsvpStatus::Accepted;
    let was_declined = from == RsvpStatus::Declined;
    let now_accepted = to == RsvpStatus::Accepted;
    let now_declined = to == RsvpStatus::Declined;
    (
        now_accepted as i64 - was_accepted as i64,
        now_declined as i64 - was_declined as i64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_bus::{BusManager, NoopPublisher, OutboxStore};
    use conflux_files::FilesStore;
    use conflux_users::UserResolver;
    use crate::media_engine::NoopMediaEngine;

    fn stores() -> (VoiceStore, Arc<ChatStore>) {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        {
            let c = conn.lock().unwrap();
            conflux_chat::db::init_db(&c).unwrap();
            conflux_files::db::init_db(&c).unwrap();
            conflux_bus::outbox::init_db(&c).unwrap();
            conflux_users::db::init_db(&c).unwrap();
            db::init_db(&c).unwrap();
        }
        let files = Arc::new(FilesStore::new(conn.clone(), std::env::temp_dir()));
        let outbox = Arc::new(OutboxStore::new(conn.clone(), 5));
        let bus = Arc::new(BusManager::new(Arc::new(NoopPublisher), outbox));
        let users = Arc::new(UserResolver::new(conn.clone()));
        let chat = Arc::new(ChatStore::new(conn.clone(), files, bus.clone(), users));
        let engine = Arc::new(NoopMediaEngine) as Arc<dyn MediaEngine>;
        (VoiceStore::new(conn, chat.clone(), bus, engine), chat)
    }

    #[tokio::test]
    async fn create_adhoc_admits_creator_as_originator_joined() {
        let (voice, _chat) = stores();
        let creator = UserId::new();
        let invitee = UserId::new();
        let conference = voice.create_adhoc(creator, "ad hoc", &[invitee], 8).unwrap();
        let participants = voice.list_participants(&conference.id).unwrap();
        let creator_p = participants.iter().find(|p| p.user_id == creator).unwrap();
        assert_eq!(creator_p.role, ConferenceRole::Originator);
        assert_eq!(creator_p.status, ConferenceParticipantStatus::Joined);
        let invitee_p = participants.iter().find(|p| p.user_id == invitee).unwrap();
        assert_eq!(invitee_p.status, ConferenceParticipantStatus::Connecting);
        assert_eq!(invitee_p.rsvp_status, RsvpStatus::Pending);
    }

    #[tokio::test]
    async fn start_chat_call_is_idempotent_for_concurrent_callers() {
        let (voice, chat) = stores();
        let a = UserId::new();
        let b = UserId::new();
        let chat_row = chat.create_chat("team", conflux_core::types::ChatType::Group, a, &[b]).unwrap();

        let first = voice.start_chat_call(&chat_row.id, a, 8).unwrap();
        let second = voice.start_chat_call(&chat_row.id, b, 8).unwrap();
        assert_eq!(first.id, second.id);

        let participants = voice.list_participants(&first.id).unwrap();
        assert!(participants.iter().any(|p| p.user_id == b && p.status == ConferenceParticipantStatus::Joined));
    }

    #[tokio::test]
    async fn joining_past_max_members_conflicts() {
        let (voice, _chat) = stores();
        let creator = UserId::new();
        let a = UserId::new();
        let b = UserId::new();
        let conference = voice.create_adhoc(creator, "small room", &[a], 2).unwrap();
        voice.join(&conference.id, a).unwrap();
        let err = voice.join(&conference.id, b).unwrap_err();
        assert!(matches!(err, VoiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn moderator_cannot_promote_participant_to_moderator() {
        let (voice, _chat) = stores();
        let originator = UserId::new();
        let moderator = UserId::new();
        let participant = UserId::new();
        let conference = voice.create_adhoc(originator, "team sync", &[moderator, participant], 8).unwrap();
        voice.change_role(&conference.id, originator, moderator, ConferenceRole::Moderator).unwrap();

        let err = voice.change_role(&conference.id, moderator, participant, ConferenceRole::Moderator).unwrap_err();
        assert!(matches!(err, VoiceError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn originator_can_promote_participant_to_moderator() {
        let (voice, _chat) = stores();
        let originator = UserId::new();
        let participant = UserId::new();
        let conference = voice.create_adhoc(originator, "team sync", &[participant], 8).unwrap();
        let promoted = voice.change_role(&conference.id, originator, participant, ConferenceRole::Moderator).unwrap();
        assert_eq!(promoted.role, ConferenceRole::Moderator);
    }

    #[tokio::test]
    async fn scheduled_reminder_is_claimed_exactly_once() {
        let (voice, _chat) = stores();
        let creator = UserId::new();
        let invitee = UserId::new();
        let scheduled_at = Utc::now() + chrono::Duration::minutes(20);
        let conference = voice.schedule(creator, "planning", scheduled_at, None, &[invitee], 8).unwrap();

        let now = scheduled_at - chrono::Duration::minutes(15);
        let first = voice.scan_due_reminders(now).unwrap();
        let second = voice.scan_due_reminders(now).unwrap();
        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert!(first.iter().any(|(c, u, _)| *c == conference.id && *u == creator));
        assert!(first.iter().any(|(c, u, _)| *c == conference.id && *u == invitee));
    }

    #[tokio::test]
    async fn leave_ends_conference_when_last_participant_departs() {
        let (voice, _chat) = stores();
        let creator = UserId::new();
        let conference = voice.create_adhoc(creator, "solo", &[], 8).unwrap();
        voice.leave(&conference.id, creator).unwrap();
        let updated = voice.get_conference(&conference.id).unwrap();
        assert_eq!(updated.status, ConferenceStatus::Ended);
    }

    #[tokio::test]
    async fn issuing_media_credentials_requires_participancy() {
        let (voice, _chat) = stores();
        let creator = UserId::new();
        let stranger = UserId::new();
        let conference = voice.create_adhoc(creator, "ad hoc", &[], 8).unwrap();

        let creds = voice.issue_media_credentials(&conference.id, &creator).unwrap();
        assert_eq!(creds.room, conference.media_room_name);

        let err = voice.issue_media_credentials(&conference.id, &stranger).unwrap_err();
        assert!(matches!(err, VoiceError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn cancel_requires_scheduled_status() {
        let (voice, _chat) = stores();
        let creator = UserId::new();
        let conference = voice.create_adhoc(creator, "ad hoc", &[], 8).unwrap();
        let err = voice.cancel(&conference.id, creator).unwrap_err();
        assert!(matches!(err, VoiceError::PreconditionFailed(_)));
    }
}
