//! Post-handshake method dispatch. One case per `conflux_protocol::methods`
//! constant; each case extracts its params, calls the matching Chat/Files/
//! Voice Core method, and maps the result (or error) onto a `ResFrame`.

use base64::Engine;
use conflux_core::{
    error::ConfluxError,
    types::{ChatId, ConferenceId, FileLinkId, MessageId, ThreadId, UserId},
};
use conflux_protocol::{frames::ResFrame, methods};
use conflux_voice::RecurrenceInput;
use serde_json::{json, Value};

use crate::app::AppState;

fn err_from(req_id: &str, e: impl Into<ConfluxError>) -> ResFrame {
    let e = e.into();
    ResFrame::err(req_id, e.code(), &e.to_string())
}

fn bad_params(req_id: &str, what: &str) -> ResFrame {
    ResFrame::err(req_id, "invalid_argument", &format!("missing or invalid '{what}'"))
}

fn field<'a>(params: Option<&'a Value>, name: &str) -> Option<&'a Value> {
    params.and_then(|p| p.get(name))
}

fn field_str<'a>(params: Option<&'a Value>, name: &str) -> Option<&'a str> {
    field(params, name).and_then(Value::as_str)
}

fn field_id<T: std::str::FromStr>(params: Option<&Value>, name: &str) -> Option<T> {
    field_str(params, name).and_then(|s| s.parse().ok())
}

fn field_u32(params: Option<&Value>, name: &str, default: u32) -> u32 {
    field(params, name).and_then(Value::as_u64).map(|n| n as u32).unwrap_or(default)
}

pub async fn route(method: &str, params: Option<&Value>, req_id: &str, app: &AppState, user_id: UserId) -> ResFrame {
    match method {
        methods::CHAT_LIST => {
            let page = field_u32(params, "page", 0);
            let count = field_u32(params, "count", 50);
            match app.chat.list_chats_for_user(&user_id, page, count) {
                Ok(chats) => ResFrame::ok(req_id, json!({ "chats": chats })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_CREATE => {
            let Some(name) = field_str(params, "name") else { return bad_params(req_id, "name") };
            let Some(chat_type) = field_str(params, "chat_type").and_then(|s| s.parse().ok()) else {
                return bad_params(req_id, "chat_type");
            };
            let participants: Vec<UserId> = field(params, "participants")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            match app.chat.create_chat(name, chat_type, user_id, &participants) {
                Ok(chat) => ResFrame::ok(req_id, json!({ "chat": chat })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_MESSAGES_LIST => {
            let Some(chat_id) = field_id::<ChatId>(params, "chat_id") else { return bad_params(req_id, "chat_id") };
            let page = field_u32(params, "page", 0);
            let count = field_u32(params, "count", 50);
            match app.chat.list_messages(&chat_id, user_id, page, count) {
                Ok(messages) => ResFrame::ok(req_id, json!({ "messages": messages })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_MESSAGES_SYNC => {
            let Some(chat_id) = field_id::<ChatId>(params, "chat_id") else { return bad_params(req_id, "chat_id") };
            let after_seq = field(params, "after_seq").and_then(Value::as_i64).unwrap_or(0);
            let limit = field_u32(params, "limit", 50);
            match app.chat.sync_messages(&chat_id, user_id, after_seq, limit) {
                Ok(result) => ResFrame::ok(req_id, json!(result)),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_MESSAGE_SEND => {
            let Some(chat_id) = field_id::<ChatId>(params, "chat_id") else { return bad_params(req_id, "chat_id") };
            let Some(content) = field_str(params, "content") else { return bad_params(req_id, "content") };
            let new_message = conflux_chat::NewMessage {
                content: content.to_string(),
                parent_id: field_id::<MessageId>(params, "parent_id"),
                thread_id: field_id::<ThreadId>(params, "thread_id"),
                reply_to_ids: field(params, "reply_to_ids")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default(),
                file_link_ids: field(params, "file_link_ids")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default(),
            };
            match app.chat.send_message(&chat_id, user_id, new_message) {
                Ok(message) => ResFrame::ok(req_id, json!({ "message": message })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_MESSAGE_EDIT => {
            let Some(message_id) = field_id::<MessageId>(params, "message_id") else {
                return bad_params(req_id, "message_id");
            };
            let Some(content) = field_str(params, "content") else { return bad_params(req_id, "content") };
            match app.chat.edit_message(&message_id, user_id, content) {
                Ok(message) => ResFrame::ok(req_id, json!({ "message": message })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_MESSAGE_DELETE => {
            let Some(message_id) = field_id::<MessageId>(params, "message_id") else {
                return bad_params(req_id, "message_id");
            };
            match app.chat.delete_message(&message_id, user_id) {
                Ok(()) => ResFrame::ok(req_id, json!({ "ok": true })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_MESSAGE_REACT => {
            let Some(message_id) = field_id::<MessageId>(params, "message_id") else {
                return bad_params(req_id, "message_id");
            };
            let Some(emoji) = field_str(params, "emoji") else { return bad_params(req_id, "emoji") };
            let remove = field(params, "remove").and_then(Value::as_bool).unwrap_or(false);
            let result = if remove {
                app.chat.remove_reaction(&message_id, user_id, emoji)
            } else {
                app.chat.add_reaction(&message_id, user_id, emoji)
            };
            match result {
                Ok(()) => ResFrame::ok(req_id, json!({ "ok": true })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_MESSAGE_FORWARD => {
            let Some(message_id) = field_id::<MessageId>(params, "message_id") else {
                return bad_params(req_id, "message_id");
            };
            let Some(target_chat_id) = field_id::<ChatId>(params, "target_chat_id") else {
                return bad_params(req_id, "target_chat_id");
            };
            match app.chat.forward_message(&message_id, &target_chat_id, user_id) {
                Ok(message) => ResFrame::ok(req_id, json!({ "message": message })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_THREAD_CREATE => {
            let Some(chat_id) = field_id::<ChatId>(params, "chat_id") else { return bad_params(req_id, "chat_id") };
            let parent_message_id = field_id::<MessageId>(params, "parent_message_id");
            let parent_thread_id = field_id::<ThreadId>(params, "parent_thread_id");
            let title = field_str(params, "title").map(str::to_string);
            let restricted = field(params, "restricted_participants").and_then(Value::as_bool).unwrap_or(false);
            match app
                .chat
                .create_thread(&chat_id, user_id, parent_message_id, parent_thread_id, title, restricted)
            {
                Ok(thread) => ResFrame::ok(req_id, json!({ "thread": thread })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_THREAD_MESSAGES_LIST => {
            let Some(thread_id) = field_id::<ThreadId>(params, "thread_id") else {
                return bad_params(req_id, "thread_id");
            };
            match app.chat.list_thread_messages(&thread_id, user_id) {
                Ok(messages) => ResFrame::ok(req_id, json!({ "messages": messages })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_THREAD_ARCHIVE => {
            let Some(thread_id) = field_id::<ThreadId>(params, "thread_id") else {
                return bad_params(req_id, "thread_id");
            };
            match app.chat.archive_thread(&thread_id, user_id) {
                Ok(()) => ResFrame::ok(req_id, json!({ "ok": true })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_PARTICIPANT_ADD => {
            let Some(chat_id) = field_id::<ChatId>(params, "chat_id") else { return bad_params(req_id, "chat_id") };
            let Some(target) = field_id::<UserId>(params, "user_id") else { return bad_params(req_id, "user_id") };
            match app.chat.add_participant(&chat_id, user_id, target) {
                Ok(()) => ResFrame::ok(req_id, json!({ "ok": true })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_PARTICIPANT_REMOVE => {
            let Some(chat_id) = field_id::<ChatId>(params, "chat_id") else { return bad_params(req_id, "chat_id") };
            let Some(target) = field_id::<UserId>(params, "user_id") else { return bad_params(req_id, "user_id") };
            match app.chat.remove_participant(&chat_id, user_id, target) {
                Ok(()) => ResFrame::ok(req_id, json!({ "ok": true })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_MESSAGE_READ => {
            let Some(message_id) = field_id::<MessageId>(params, "message_id") else {
                return bad_params(req_id, "message_id");
            };
            match app.chat.mark_as_read(&message_id, user_id) {
                Ok(()) => ResFrame::ok(req_id, json!({ "ok": true })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::CHAT_TYPING => {
            let Some(chat_id) = field_id::<ChatId>(params, "chat_id") else { return bad_params(req_id, "chat_id") };
            match app.chat.broadcast_typing(&chat_id, user_id) {
                Ok(()) => ResFrame::ok(req_id, json!({ "ok": true })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::FILES_UPLOAD => {
            let Some(filename) = field_str(params, "filename") else { return bad_params(req_id, "filename") };
            let content_type = field_str(params, "content_type").unwrap_or("application/octet-stream");
            let Some(data_b64) = field_str(params, "data_base64") else {
                return bad_params(req_id, "data_base64");
            };
            let bytes = match base64::engine::general_purpose::STANDARD.decode(data_b64) {
                Ok(b) => b,
                Err(_) => return bad_params(req_id, "data_base64"),
            };
            if bytes.len() as u64 > app.config.files.max_upload_bytes {
                return err_from(req_id, ConfluxError::PayloadTooLarge { size: bytes.len(), max: app.config.files.max_upload_bytes as usize });
            }
            match app.files.upload(filename, content_type, &bytes, user_id).await {
                Ok((file_id, link_id)) => {
                    ResFrame::ok(req_id, json!({ "file_id": file_id, "link_id": link_id }))
                }
                Err(e) => err_from(req_id, e),
            }
        }

        methods::FILES_DOWNLOAD => {
            let Some(link_id) = field_id::<FileLinkId>(params, "link_id") else {
                return bad_params(req_id, "link_id");
            };
            match app.files.download(&link_id, &user_id).await {
                Ok((file, bytes)) => ResFrame::ok(
                    req_id,
                    json!({ "file": file, "data_base64": base64::engine::general_purpose::STANDARD.encode(&bytes) }),
                ),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::FILES_DELETE => {
            let Some(link_id) = field_id::<FileLinkId>(params, "link_id") else {
                return bad_params(req_id, "link_id");
            };
            match app.files.delete(&link_id, &user_id) {
                Ok(()) => ResFrame::ok(req_id, json!({ "ok": true })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::FILES_SHARE_LINK_CREATE => {
            let Some(file_id) = field_id::<conflux_core::types::FileId>(params, "file_id") else {
                return bad_params(req_id, "file_id");
            };
            let opts = conflux_files::ShareLinkOpts {
                password: field_str(params, "password").map(str::to_string),
                max_downloads: field(params, "max_downloads").and_then(Value::as_i64),
                expires_at: field_str(params, "expires_at").and_then(|s| s.parse().ok()),
            };
            match app.files.create_share_link(file_id, user_id, opts) {
                Ok(link) => ResFrame::ok(req_id, json!({ "share_link": link })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::FILES_GROUP_CREATE => {
            let Some(name) = field_str(params, "name") else { return bad_params(req_id, "name") };
            let can_read = field(params, "can_read").and_then(Value::as_bool).unwrap_or(true);
            let can_delete = field(params, "can_delete").and_then(Value::as_bool).unwrap_or(false);
            let can_transfer = field(params, "can_transfer").and_then(Value::as_bool).unwrap_or(false);
            match app.files.create_group(name, can_read, can_delete, can_transfer) {
                Ok(group) => ResFrame::ok(req_id, json!({ "group": group })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::FILES_GROUP_DELETE => {
            let Some(group_id) = field_id::<conflux_core::types::FileGroupId>(params, "group_id") else {
                return bad_params(req_id, "group_id");
            };
            match app.files.delete_group(&group_id) {
                Ok(()) => ResFrame::ok(req_id, json!({ "ok": true })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::VOICE_CALL_START => {
            let Some(chat_id) = field_id::<ChatId>(params, "chat_id") else { return bad_params(req_id, "chat_id") };
            let max_members = field_u32(params, "max_members", 50);
            match app.voice.start_chat_call(&chat_id, user_id, max_members) {
                Ok(conference) => match app.voice.issue_media_credentials(&conference.id, &user_id) {
                    Ok(credentials) => ResFrame::ok(req_id, json!({ "conference": conference, "credentials": credentials })),
                    Err(e) => err_from(req_id, e),
                },
                Err(e) => err_from(req_id, e),
            }
        }

        methods::VOICE_CONFERENCE_SCHEDULE => {
            let Some(name) = field_str(params, "name") else { return bad_params(req_id, "name") };
            let Some(scheduled_at) = field_str(params, "scheduled_at").and_then(|s| s.parse().ok()) else {
                return bad_params(req_id, "scheduled_at");
            };
            let recurrence = field(params, "recurrence").and_then(|v| {
                Some(RecurrenceInput {
                    frequency: v.get("frequency")?.as_str()?.parse().ok()?,
                    days_of_week: v
                        .get("days_of_week")
                        .and_then(|d| serde_json::from_value(d.clone()).ok())
                        .unwrap_or_default(),
                    day_of_month: v.get("day_of_month").and_then(Value::as_u64).map(|n| n as u8),
                    until_date: v.get("until_date").and_then(Value::as_str).and_then(|s| s.parse().ok()),
                    occurrence_count: v.get("occurrence_count").and_then(Value::as_u64).map(|n| n as u32),
                })
            });
            let participants: Vec<UserId> = field(params, "participants")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            let max_members = field_u32(params, "max_members", 50);
            match app.voice.schedule(user_id, name, scheduled_at, recurrence, &participants, max_members) {
                Ok(conference) => ResFrame::ok(req_id, json!({ "conference": conference })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::VOICE_CONFERENCE_RSVP => {
            let Some(conference_id) = field_id::<ConferenceId>(params, "conference_id") else {
                return bad_params(req_id, "conference_id");
            };
            let Some(status) = field_str(params, "status").and_then(|s| s.parse().ok()) else {
                return bad_params(req_id, "status");
            };
            match app.voice.set_rsvp(&conference_id, user_id, status) {
                Ok(participant) => ResFrame::ok(req_id, json!({ "participant": participant })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::VOICE_CONFERENCE_ROLE_SET => {
            let Some(conference_id) = field_id::<ConferenceId>(params, "conference_id") else {
                return bad_params(req_id, "conference_id");
            };
            let Some(target) = field_id::<UserId>(params, "target_user_id") else {
                return bad_params(req_id, "target_user_id");
            };
            let Some(role) = field_str(params, "role").and_then(|s| s.parse().ok()) else {
                return bad_params(req_id, "role");
            };
            match app.voice.change_role(&conference_id, user_id, target, role) {
                Ok(participant) => ResFrame::ok(req_id, json!({ "participant": participant })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::VOICE_CONFERENCE_MUTE => {
            let Some(conference_id) = field_id::<ConferenceId>(params, "conference_id") else {
                return bad_params(req_id, "conference_id");
            };
            let Some(target) = field_id::<UserId>(params, "target_user_id") else {
                return bad_params(req_id, "target_user_id");
            };
            let muted = field(params, "muted").and_then(Value::as_bool).unwrap_or(true);
            match app.voice.mute(&conference_id, user_id, target, muted) {
                Ok(()) => ResFrame::ok(req_id, json!({ "ok": true })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::VOICE_CONFERENCE_KICK => {
            let Some(conference_id) = field_id::<ConferenceId>(params, "conference_id") else {
                return bad_params(req_id, "conference_id");
            };
            let Some(target) = field_id::<UserId>(params, "target_user_id") else {
                return bad_params(req_id, "target_user_id");
            };
            match app.voice.kick(&conference_id, user_id, target) {
                Ok(()) => ResFrame::ok(req_id, json!({ "ok": true })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::VOICE_CONFERENCE_CANCEL => {
            let Some(conference_id) = field_id::<ConferenceId>(params, "conference_id") else {
                return bad_params(req_id, "conference_id");
            };
            match app.voice.cancel(&conference_id, user_id) {
                Ok(()) => ResFrame::ok(req_id, json!({ "ok": true })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::VOICE_CONFERENCE_END => {
            let Some(conference_id) = field_id::<ConferenceId>(params, "conference_id") else {
                return bad_params(req_id, "conference_id");
            };
            match app.voice.end_conference(&conference_id, user_id) {
                Ok(()) => ResFrame::ok(req_id, json!({ "ok": true })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::VOICE_CONFERENCE_LEAVE => {
            let Some(conference_id) = field_id::<ConferenceId>(params, "conference_id") else {
                return bad_params(req_id, "conference_id");
            };
            match app.voice.leave(&conference_id, user_id) {
                Ok(()) => ResFrame::ok(req_id, json!({ "ok": true })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::VOICE_CONFERENCE_PARTICIPANTS_LIST => {
            let Some(conference_id) = field_id::<ConferenceId>(params, "conference_id") else {
                return bad_params(req_id, "conference_id");
            };
            match app.voice.list_participants(&conference_id) {
                Ok(participants) => ResFrame::ok(req_id, json!({ "participants": participants })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::VOICE_CONFERENCE_SCHEDULED_LIST => {
            let Some(before) = field_str(params, "before").and_then(|s| s.parse().ok()) else {
                return bad_params(req_id, "before");
            };
            match app.voice.list_scheduled_conferences(before) {
                Ok(conferences) => ResFrame::ok(req_id, json!({ "conferences": conferences })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::VOICE_CONFERENCE_OCCURRENCE_RSVP => {
            let Some(series_id) = field_id::<ConferenceId>(params, "series_id") else {
                return bad_params(req_id, "series_id");
            };
            let Some(occurrence_at) = field_str(params, "occurrence_at").and_then(|s| s.parse().ok()) else {
                return bad_params(req_id, "occurrence_at");
            };
            let Some(status) = field_str(params, "status").and_then(|s| s.parse().ok()) else {
                return bad_params(req_id, "status");
            };
            match app.voice.rsvp_on_occurrence(&series_id, occurrence_at, user_id, status) {
                Ok(conference) => ResFrame::ok(req_id, json!({ "conference": conference })),
                Err(e) => err_from(req_id, e),
            }
        }

        methods::VOICE_CONFERENCE_EVENTS_LIST => {
            let Some(conference_id) = field_id::<ConferenceId>(params, "conference_id") else {
                return bad_params(req_id, "conference_id");
            };
            match app.voice.list_events(&conference_id) {
                Ok(events) => ResFrame::ok(req_id, json!({ "events": events })),
                Err(e) => err_from(req_id, e),
            }
        }

        _ => ResFrame::err(req_id, "method_not_found", &format!("method '{method}' not found")),
    }
}
