use std::sync::{Arc, Mutex};

use chrono::Utc;
use conflux_bus::BusManager;
use conflux_core::types::{
    ChatId, ChatType, FileGroupId, MAX_THREAD_DEPTH, MessageId, ParticipantRole, ThreadId,
    ThreadType, UserId,
};
use conflux_files::FilesStore;
use conflux_protocol::frames::{EventEnvelope, RoutingKey};
use conflux_users::UserResolver;
use rusqlite::Connection;
use serde_json::json;
use tracing::instrument;

use crate::db;
use crate::error::{ChatError, Result};
use crate::types::{Chat, ChatParticipant, Message, NewMessage, Reaction, SyncResult, Thread, SYSTEM_THREAD_TITLE};

/// Chat Core: chats, threads, messages, reactions, read status, forwarding
///. Owner of the chat-file-group bindings.
pub struct ChatStore {
    conn: Arc<Mutex<Connection>>,
    files: Arc<FilesStore>,
    bus: Arc<BusManager>,
    users: Arc<UserResolver>,
}

impl ChatStore {
    pub fn new(conn: Arc<Mutex<Connection>>, files: Arc<FilesStore>, bus: Arc<BusManager>, users: Arc<UserResolver>) -> Self {
        Self { conn, files, bus, users }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("chat connection poisoned")
    }

    /// A guest's global role never permits holding chat
    /// `admin` or writing messages, independent of their `ParticipantRole`.
    fn reject_guest(&self, user_id: &UserId) -> Result<()> {
        if self.users.role_of(&user_id.to_string())?.is_some_and(|r| r.is_guest()) {
            return Err(ChatError::PermissionDenied(format!("{user_id} is a guest")));
        }
        Ok(())
    }

    /// `CreateChat(name, chat_type, creator, participants)` — the creator is
    /// admitted as `admin` atomically with the chat row; `direct` chats are
    /// pinned at exactly two participants; a `system` thread titled
    /// "Activity" is inserted in the same transaction.
    #[instrument(skip(self, participants))]
    pub fn create_chat(
        &self,
        name: &str,
        chat_type: ChatType,
        creator: UserId,
        participants: &[UserId],
    ) -> Result<Chat> {
        if chat_type == ChatType::Direct && participants.len() != 1 {
            return Err(ChatError::InvalidArgument(
                "direct chats require exactly one other participant".to_string(),
            ));
        }
        // the creator is admitted as admin atomically below; a guest may never hold admin.
        self.reject_guest(&creator)?;

        let now = Utc::now();
        let chat = Chat {
            id: ChatId::new(),
            name: name.to_string(),
            chat_type,
            created_by: creator,
            created_at: now,
            updated_at: now,
        };

        let system_thread = Thread {
            id: ThreadId::new(),
            chat_id: chat.id,
            parent_message_id: None,
            parent_thread_id: None,
            thread_type: ThreadType::System,
            title: Some(SYSTEM_THREAD_TITLE.to_string()),
            created_by: None,
            depth: 0,
            restricted_participants: false,
            is_archived: false,
            created_at: now,
        };

        let moderate_group;
        let read_group;
        {
            let conn = self.lock();
            db::insert_chat(&conn, &chat)?;
            db::insert_participant(
                &conn,
                &ChatParticipant {
                    chat_id: chat.id,
                    user_id: creator,
                    role: ParticipantRole::Admin,
                    joined_at: now,
                },
            )?;
            for &user_id in participants {
                if user_id == creator {
                    continue;
                }
                db::insert_participant(
                    &conn,
                    &ChatParticipant {
                        chat_id: chat.id,
                        user_id,
                        role: ParticipantRole::Member,
                        joined_at: now,
                    },
                )?;
            }
            db::insert_thread(&conn, &system_thread)?;

            moderate_group = FilesStore::create_group_with_conn(&conn, "moderate", true, true, true)?;
            read_group = FilesStore::create_group_with_conn(&conn, "read", true, false, false)?;
            FilesStore::add_user_to_group_with_conn(&conn, &moderate_group.id, &creator)?;
            for &user_id in participants {
                FilesStore::add_user_to_group_with_conn(&conn, &read_group.id, &user_id)?;
            }
            db::set_chat_file_group(&conn, &chat.id, "moderate", &moderate_group.id.to_string())?;
            db::set_chat_file_group(&conn, &chat.id, "read", &read_group.id.to_string())?;
        }

        self.publish(RoutingKey::ChatCreated, creator, self.participant_ids(&chat.id)?, Some(chat.id), None, json!({ "chat_id": chat.id }));
        Ok(chat)
    }

    pub fn get_chat(&self, chat_id: &ChatId) -> Result<Chat> {
        let conn = self.lock();
        db::get_chat(&conn, chat_id)?.ok_or_else(|| ChatError::NotFound(chat_id.to_string()))
    }

    pub fn list_chats_for_user(&self, user_id: &UserId, page: u32, count: u32) -> Result<Vec<Chat>> {
        let conn = self.lock();
        db::list_chats_for_user(&conn, user_id, page, count)
    }

    fn require_participant(&self, conn: &Connection, chat_id: &ChatId, user_id: &UserId) -> Result<ChatParticipant> {
        db::get_participant(conn, chat_id, user_id)?
            .ok_or_else(|| ChatError::PermissionDenied(format!("{user_id} is not a participant of {chat_id}")))
    }

    fn participant_ids(&self, chat_id: &ChatId) -> Result<Vec<UserId>> {
        let conn = self.lock();
        Ok(db::list_participants(&conn, chat_id)?.into_iter().map(|p| p.user_id).collect())
    }

    /// `AddParticipant` — requires `admin` on the requester.
    #[instrument(skip(self))]
    pub fn add_participant(&self, chat_id: &ChatId, requester: UserId, user_id: UserId) -> Result<()> {
        let now = Utc::now();
        let read_group_id;
        {
            let conn = self.lock();
            let chat = db::get_chat(&conn, chat_id)?.ok_or_else(|| ChatError::NotFound(chat_id.to_string()))?;
            if chat.chat_type == ChatType::Direct {
                return Err(ChatError::PreconditionFailed("direct chats are pinned at two participants".to_string()));
            }
            let requester_p = self.require_participant(&conn, chat_id, &requester)?;
            if !requester_p.role.is_admin() {
                return Err(ChatError::PermissionDenied(format!("{requester} is not an admin of {chat_id}")));
            }
            if db::get_participant(&conn, chat_id, &user_id)?.is_some() {
                return Err(ChatError::Conflict(format!("{user_id} is already a participant")));
            }
            db::insert_participant(
                &conn,
                &ChatParticipant {
                    chat_id: *chat_id,
                    user_id,
                    role: ParticipantRole::Member,
                    joined_at: now,
                },
            )?;
            read_group_id = db::get_chat_file_groups(&conn, chat_id)?
                .into_iter()
                .find(|(role, _)| role == "read")
                .map(|(_, id)| id);
        }
        if let Some(group_id) = read_group_id.as_ref().and_then(|s| s.parse::<FileGroupId>().ok()) {
            self.files.add_user_to_group(&group_id, &user_id)?;
        }

        self.send_system_message(chat_id, &format!("{user_id} joined the chat"), false)?;
        self.publish(RoutingKey::ParticipantAdded, requester, self.participant_ids(chat_id)?, Some(*chat_id), None, json!({ "user_id": user_id }));
        Ok(())
    }

    /// `RemoveParticipant` — requires `admin`; the last admin may never be
    /// removed. Revokes group-derived file access too.
    #[instrument(skip(self))]
    pub fn remove_participant(&self, chat_id: &ChatId, requester: UserId, user_id: UserId) -> Result<()> {
        let group_ids;
        {
            let conn = self.lock();
            let requester_p = self.require_participant(&conn, chat_id, &requester)?;
            if !requester_p.role.is_admin() {
                return Err(ChatError::PermissionDenied(format!("{requester} is not an admin of {chat_id}")));
            }
            let target = self.require_participant(&conn, chat_id, &user_id)?;
            if target.role.is_admin() && db::count_admins(&conn, chat_id)? <= 1 {
                return Err(ChatError::PreconditionFailed("cannot remove the last admin".to_string()));
            }
            db::remove_participant(&conn, chat_id, &user_id)?;
            group_ids = db::get_chat_file_groups(&conn, chat_id)?
                .into_iter()
                .filter_map(|(_, id)| id.parse::<FileGroupId>().ok())
                .collect::<Vec<_>>();
        }
        self.files.remove_user_from_all_group_files(&group_ids, &user_id)?;

        self.send_system_message(chat_id, &format!("{user_id} left the chat"), false)?;
        self.publish(RoutingKey::ParticipantRemoved, requester, self.participant_ids(chat_id)?, Some(*chat_id), None, json!({ "user_id": user_id }));
        Ok(())
    }

    /// `SendMessage(chat, sender, new_message)` — allocates `seq_num` under
    /// the connection's exclusive lock, enforces the writer-role matrix,
    /// channel role gating, and thread restriction.
    #[instrument(skip(self, new_message))]
    pub fn send_message(&self, chat_id: &ChatId, sender: UserId, new_message: NewMessage) -> Result<Message> {
        self.reject_guest(&sender)?;
        let conn = self.lock();
        let chat = db::get_chat(&conn, chat_id)?.ok_or_else(|| ChatError::NotFound(chat_id.to_string()))?;
        let participant = self.require_participant(&conn, chat_id, &sender)?;

        if !participant.role.can_write() {
            return Err(ChatError::PermissionDenied(format!("{sender} cannot write in {chat_id}")));
        }
        if chat.chat_type == ChatType::Channel && !participant.role.is_admin() {
            return Err(ChatError::PermissionDenied("channel writes require admin".to_string()));
        }
        if let Some(thread_id) = new_message.thread_id {
            let thread = db::get_thread(&conn, &thread_id)?.ok_or_else(|| ChatError::NotFound(thread_id.to_string()))?;
            if thread.restricted_participants && !db::is_thread_participant(&conn, &thread_id, &sender)? {
                return Err(ChatError::PermissionDenied(format!("{sender} is not a participant of thread {thread_id}")));
            }
        }

        let message = self.insert_message_locked(&conn, chat_id, Some(sender), new_message, false)?;
        drop(conn);

        self.publish(RoutingKey::MessageCreated, sender, self.participant_ids(chat_id)?, Some(*chat_id), None, json!({ "message_id": message.id, "seq_num": message.seq_num }));
        Ok(message)
    }

    /// `SendSystemMessage` — bypasses the writer-role check, sender nil,
    /// `is_system=true`. Routes into the chat's system thread unless
    /// `to_main_chat` is set (conference lifecycle notices).
    #[instrument(skip(self))]
    pub fn send_system_message(&self, chat_id: &ChatId, content: &str, to_main_chat: bool) -> Result<Message> {
        let conn = self.lock();
        db::get_chat(&conn, chat_id)?.ok_or_else(|| ChatError::NotFound(chat_id.to_string()))?;
        let thread_id = if to_main_chat {
            None
        } else {
            Some(
                db::get_system_thread(&conn, chat_id)?
                    .ok_or_else(|| ChatError::NotFound(format!("system thread for {chat_id}")))?
                    .id,
            )
        };
        let new_message = NewMessage {
            content: content.to_string(),
            thread_id,
            ..Default::default()
        };
        let message = self.insert_message_locked(&conn, chat_id, None, new_message, true)?;
        Ok(message)
    }

    fn insert_message_locked(
        &self,
        conn: &Connection,
        chat_id: &ChatId,
        sender: Option<UserId>,
        new_message: NewMessage,
        is_system: bool,
    ) -> Result<Message> {
        let seq_num = db::next_seq_num(conn, chat_id)?;
        let now = Utc::now();
        let message = Message {
            id: MessageId::new(),
            chat_id: *chat_id,
            sender_id: sender,
            content: new_message.content,
            sent_at: now,
            updated_at: None,
            parent_id: new_message.parent_id,
            thread_id: new_message.thread_id,
            reply_to_ids: new_message.reply_to_ids,
            forwarded_from_message_id: None,
            forwarded_from_chat_id: None,
            file_link_ids: new_message.file_link_ids,
            is_system,
            is_deleted: false,
            is_moderated_deletion: false,
            seq_num,
        };
        db::insert_message(conn, &message)?;
        db::touch_chat(conn, chat_id)?;
        Ok(message)
    }

    /// `EditMessage` — sender-only (edit window is a policy hook, not
    /// enforced by core).
    #[instrument(skip(self, content))]
    pub fn edit_message(&self, message_id: &MessageId, requester: UserId, content: &str) -> Result<Message> {
        let conn = self.lock();
        let message = db::get_message(&conn, message_id)?.ok_or_else(|| ChatError::NotFound(message_id.to_string()))?;
        if message.sender_id != Some(requester) {
            return Err(ChatError::PermissionDenied(format!("{requester} did not send {message_id}")));
        }
        db::update_message_content(&conn, message_id, content)?;
        let updated = db::get_message(&conn, message_id)?.ok_or_else(|| ChatError::NotFound(message_id.to_string()))?;
        drop(conn);
        self.publish(RoutingKey::MessageUpdated, requester, self.participant_ids(&message.chat_id)?, Some(message.chat_id), None, json!({ "message_id": message_id }));
        Ok(updated)
    }

    /// `DeleteMessage` — sender can delete their own message; `admin` can
    /// moderated-delete anyone's, carrying `is_moderated_deletion=true`
    ///.
    #[instrument(skip(self))]
    pub fn delete_message(&self, message_id: &MessageId, requester: UserId) -> Result<()> {
        let conn = self.lock();
        let message = db::get_message(&conn, message_id)?.ok_or_else(|| ChatError::NotFound(message_id.to_string()))?;
        let moderated = if message.sender_id == Some(requester) {
            false
        } else {
            let requester_p = self.require_participant(&conn, &message.chat_id, &requester)?;
            if !requester_p.role.is_admin() {
                return Err(ChatError::PermissionDenied(format!("{requester} cannot delete {message_id}")));
            }
            true
        };
        db::soft_delete_message(&conn, message_id, moderated)?;
        drop(conn);
        self.publish(RoutingKey::MessageDeleted, requester, self.participant_ids(&message.chat_id)?, Some(message.chat_id), None, json!({ "message_id": message_id, "is_moderated_deletion": moderated }));
        Ok(())
    }

    pub fn add_reaction(&self, message_id: &MessageId, user_id: UserId, emoji: &str) -> Result<()> {
        let conn = self.lock();
        let message = db::get_message(&conn, message_id)?.ok_or_else(|| ChatError::NotFound(message_id.to_string()))?;
        self.require_participant(&conn, &message.chat_id, &user_id)?;
        db::insert_reaction(&conn, &Reaction { message_id: *message_id, user_id, emoji: emoji.to_string() })?;
        drop(conn);
        self.publish(RoutingKey::ReactionAdded, user_id, self.participant_ids(&message.chat_id)?, Some(message.chat_id), None, json!({ "message_id": message_id, "emoji": emoji }));
        Ok(())
    }

    pub fn remove_reaction(&self, message_id: &MessageId, user_id: UserId, emoji: &str) -> Result<()> {
        let conn = self.lock();
        let message = db::get_message(&conn, message_id)?.ok_or_else(|| ChatError::NotFound(message_id.to_string()))?;
        db::remove_reaction(&conn, message_id, &user_id, emoji)?;
        drop(conn);
        self.publish(RoutingKey::ReactionRemoved, user_id, self.participant_ids(&message.chat_id)?, Some(message.chat_id), None, json!({ "message_id": message_id, "emoji": emoji }));
        Ok(())
    }

    /// `MarkAsRead` — requires the caller be a participant.
    pub fn mark_as_read(&self, message_id: &MessageId, user_id: UserId) -> Result<()> {
        let conn = self.lock();
        let message = db::get_message(&conn, message_id)?.ok_or_else(|| ChatError::NotFound(message_id.to_string()))?;
        self.require_participant(&conn, &message.chat_id, &user_id)?;
        db::mark_read(&conn, message_id, &user_id)
    }

    /// `Typing(chat, user)` — ephemeral presence signal, never persisted.
    pub fn broadcast_typing(&self, chat_id: &ChatId, user_id: UserId) -> Result<()> {
        {
            let conn = self.lock();
            self.require_participant(&conn, chat_id, &user_id)?;
        }
        let participants = self.participant_ids(chat_id)?;
        self.publish(RoutingKey::Typing, user_id, participants, Some(*chat_id), None, json!({ "user_id": user_id }));
        Ok(())
    }

    /// `CreateThread(chat, parent_message_id, ...)` — idempotent on
    /// `(chat_id, parent_message_id)` for reply threads; depth bounded at
    /// `MAX_THREAD_DEPTH`.
    #[instrument(skip(self))]
    pub fn create_thread(
        &self,
        chat_id: &ChatId,
        requester: UserId,
        parent_message_id: Option<MessageId>,
        parent_thread_id: Option<ThreadId>,
        title: Option<String>,
        restricted_participants: bool,
    ) -> Result<Thread> {
        let conn = self.lock();
        self.require_participant(&conn, chat_id, &requester)?;

        if let Some(parent_message_id) = parent_message_id {
            if let Some(existing) = db::get_thread_by_parent_message(&conn, chat_id, &parent_message_id)? {
                return Ok(existing);
            }
            let parent_message = db::get_message(&conn, &parent_message_id)?
                .ok_or_else(|| ChatError::NotFound(parent_message_id.to_string()))?;
            if parent_message.chat_id != *chat_id {
                return Err(ChatError::InvalidArgument("parent message belongs to a different chat".to_string()));
            }
        }

        let depth = match parent_thread_id {
            None => 0,
            Some(parent_id) => {
                let parent = db::get_thread(&conn, &parent_id)?.ok_or_else(|| ChatError::NotFound(parent_id.to_string()))?;
                let depth = parent.depth + 1;
                if depth > MAX_THREAD_DEPTH {
                    return Err(ChatError::PreconditionFailed("thread depth exceeded".to_string()));
                }
                depth
            }
        };

        let thread = Thread {
            id: ThreadId::new(),
            chat_id: *chat_id,
            parent_message_id,
            parent_thread_id,
            thread_type: ThreadType::User,
            title,
            created_by: Some(requester),
            depth,
            restricted_participants,
            is_archived: false,
            created_at: Utc::now(),
        };
        db::insert_thread(&conn, &thread)?;
        db::add_thread_participant(&conn, &thread.id, &requester)?;
        drop(conn);
        self.publish(RoutingKey::ThreadCreated, requester, self.participant_ids(chat_id)?, Some(*chat_id), None, json!({ "thread_id": thread.id }));
        Ok(thread)
    }

    /// `ArchiveThread` — thread creator or chat admin.
    #[instrument(skip(self))]
    pub fn archive_thread(&self, thread_id: &ThreadId, requester: UserId) -> Result<()> {
        let conn = self.lock();
        let thread = db::get_thread(&conn, thread_id)?.ok_or_else(|| ChatError::NotFound(thread_id.to_string()))?;
        let is_creator = thread.created_by == Some(requester);
        if !is_creator {
            let requester_p = self.require_participant(&conn, &thread.chat_id, &requester)?;
            if !requester_p.role.is_admin() {
                return Err(ChatError::PermissionDenied(format!("{requester} cannot archive {thread_id}")));
            }
        }
        db::archive_thread(&conn, thread_id)?;
        drop(conn);
        self.publish(RoutingKey::ThreadArchived, requester, self.participant_ids(&thread.chat_id)?, Some(thread.chat_id), None, json!({ "thread_id": thread_id }));
        Ok(())
    }

    /// `ForwardMessage(source_msg, target_chat, actor)` — requires write
    /// access on target, read access on source; allocates a new `FileLink`
    /// per attachment, attaches each to the target chat's `read` group, and
    /// emits `message.created`.
    #[instrument(skip(self))]
    pub fn forward_message(&self, source_msg: &MessageId, target_chat: &ChatId, actor: UserId) -> Result<Message> {
        let conn = self.lock();
        let source = db::get_message(&conn, source_msg)?.ok_or_else(|| ChatError::NotFound(source_msg.to_string()))?;
        self.require_participant(&conn, &source.chat_id, &actor)?;

        let target = db::get_chat(&conn, target_chat)?.ok_or_else(|| ChatError::NotFound(target_chat.to_string()))?;
        let target_participant = self.require_participant(&conn, target_chat, &actor)?;
        if !target_participant.role.can_write() {
            return Err(ChatError::PermissionDenied(format!("{actor} cannot write in {target_chat}")));
        }
        if target.chat_type == ChatType::Channel && !target_participant.role.is_admin() {
            return Err(ChatError::PermissionDenied("channel writes require admin".to_string()));
        }

        let mut new_link_ids = Vec::with_capacity(source.file_link_ids.len());
        for link_id in &source.file_link_ids {
            let link = conflux_files::db::get_link(&conn, link_id)?.ok_or_else(|| ChatError::NotFound(link_id.to_string()))?;
            let new_link_id = FilesStore::create_file_link_with_conn(&conn, link.file_id, actor)?;
            new_link_ids.push(new_link_id);
        }
        let read_group: Option<FileGroupId> = db::get_chat_file_groups(&conn, target_chat)?
            .into_iter()
            .find(|(role, _)| role == "read")
            .and_then(|(_, id)| id.parse().ok());
        if let Some(group_id) = read_group {
            for link_id in &new_link_ids {
                FilesStore::add_file_link_to_groups_with_conn(&conn, link_id, &[group_id])?;
            }
        }

        let new_message = NewMessage {
            content: source.content.clone(),
            file_link_ids: new_link_ids,
            ..Default::default()
        };
        let seq_num = db::next_seq_num(&conn, target_chat)?;
        let now = Utc::now();
        let message = Message {
            id: MessageId::new(),
            chat_id: *target_chat,
            sender_id: Some(actor),
            content: new_message.content,
            sent_at: now,
            updated_at: None,
            parent_id: None,
            thread_id: None,
            reply_to_ids: Vec::new(),
            forwarded_from_message_id: Some(source.id),
            forwarded_from_chat_id: Some(source.chat_id),
            file_link_ids: new_message.file_link_ids,
            is_system: false,
            is_deleted: false,
            is_moderated_deletion: false,
            seq_num,
        };
        db::insert_message(&conn, &message)?;
        db::touch_chat(&conn, target_chat)?;
        drop(conn);

        self.publish(RoutingKey::MessageCreated, actor, self.participant_ids(target_chat)?, Some(*target_chat), None, json!({ "message_id": message.id, "seq_num": message.seq_num }));
        Ok(message)
    }

    /// `SyncMessages(chat_id, after_seq, limit)` — the offline-sync
    /// primitive; ascending by `seq_num`.
    pub fn sync_messages(&self, chat_id: &ChatId, requester: UserId, after_seq: i64, limit: u32) -> Result<SyncResult> {
        let conn = self.lock();
        self.require_participant(&conn, chat_id, &requester)?;
        let (messages, has_more) = db::sync_messages(&conn, chat_id, after_seq, limit)?;
        Ok(SyncResult { messages, has_more })
    }

    /// `ListMessages` — paginated, descending by `sent_at`.
    pub fn list_messages(&self, chat_id: &ChatId, requester: UserId, page: u32, count: u32) -> Result<Vec<Message>> {
        let conn = self.lock();
        self.require_participant(&conn, chat_id, &requester)?;
        db::list_messages(&conn, chat_id, page, count)
    }

    pub fn list_thread_messages(&self, thread_id: &ThreadId, requester: UserId) -> Result<Vec<Message>> {
        let conn = self.lock();
        let thread = db::get_thread(&conn, thread_id)?.ok_or_else(|| ChatError::NotFound(thread_id.to_string()))?;
        self.require_participant(&conn, &thread.chat_id, &requester)?;
        db::list_thread_messages(&conn, thread_id)
    }

    fn publish(
        &self,
        routing_key: RoutingKey,
        actor_id: UserId,
        participants: Vec<UserId>,
        chat_id: Option<ChatId>,
        conference_id: Option<conflux_core::types::ConferenceId>,
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

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_bus::{BusManager, NoopPublisher, OutboxStore};

    fn store() -> ChatStore {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        {
            let c = conn.lock().unwrap();
            db::init_db(&c).unwrap();
            conflux_files::db::init_db(&c).unwrap();
            conflux_bus::outbox::init_db(&c).unwrap();
            conflux_users::db::init_db(&c).unwrap();
        }
        let files = Arc::new(FilesStore::new(conn.clone(), std::env::temp_dir()));
        let outbox = Arc::new(OutboxStore::new(conn.clone(), 5));
        let bus = Arc::new(BusManager::new(Arc::new(NoopPublisher), outbox));
        let users = Arc::new(UserResolver::new(conn.clone()));
        ChatStore::new(conn, files, bus, users)
    }

    #[tokio::test]
    async fn create_chat_admits_creator_as_admin() {
        let store = store();
        let creator = UserId::new();
        let chat = store.create_chat("general", ChatType::Group, creator, &[]).unwrap();
        let participant = {
            let conn = store.lock();
            db::get_participant(&conn, &chat.id, &creator).unwrap().unwrap()
        };
        assert_eq!(participant.role, ParticipantRole::Admin);
    }

    #[tokio::test]
    async fn direct_chat_requires_exactly_one_other_participant() {
        let store = store();
        let creator = UserId::new();
        let a = UserId::new();
        let b = UserId::new();
        let err = store.create_chat("dm", ChatType::Direct, creator, &[a, b]).unwrap_err();
        assert!(matches!(err, ChatError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn viewer_cannot_write_messages() {
        let store = store();
        let creator = UserId::new();
        let viewer = UserId::new();
        let chat = store.create_chat("general", ChatType::Group, creator, &[viewer]).unwrap();
        {
            let conn = store.lock();
            db::update_participant_role(&conn, &chat.id, &viewer, ParticipantRole::Viewer).unwrap();
        }
        let err = store
            .send_message(&chat.id, viewer, NewMessage { content: "hi".to_string(), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, ChatError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn offline_sync_returns_exact_seq_range() {
        let store = store();
        let creator = UserId::new();
        let chat = store.create_chat("general", ChatType::Group, creator, &[]).unwrap();
        for i in 0..3 {
            store
                .send_message(&chat.id, creator, NewMessage { content: format!("msg{i}"), ..Default::default() })
                .unwrap();
        }
        // seq 1 is reserved by the system thread? no — system thread creation
        // doesn't insert a message, so the three sends are seq 1,2,3.
        let result = store.sync_messages(&chat.id, creator, 0, 100).unwrap();
        assert_eq!(result.messages.len(), 3);
        assert!(!result.has_more);
        assert_eq!(result.messages[0].seq_num.0, 1);
        assert_eq!(result.messages[2].seq_num.0, 3);
    }

    #[tokio::test]
    async fn thread_creation_on_same_parent_message_is_idempotent() {
        let store = store();
        let creator = UserId::new();
        let chat = store.create_chat("general", ChatType::Group, creator, &[]).unwrap();
        let message = store
            .send_message(&chat.id, creator, NewMessage { content: "root".to_string(), ..Default::default() })
            .unwrap();
        let t1 = store.create_thread(&chat.id, creator, Some(message.id), None, None, false).unwrap();
        let t2 = store.create_thread(&chat.id, creator, Some(message.id), None, None, false).unwrap();
        assert_eq!(t1.id, t2.id);
    }

    #[tokio::test]
    async fn guest_sending_message_without_membership_is_permission_denied() {
        let store = store();
        let creator = UserId::new();
        let chat = store.create_chat("general", ChatType::Group, creator, &[]).unwrap();
        let guest = UserId::new();
        let err = store
            .send_message(&chat.id, guest, NewMessage { content: "hi".to_string(), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, ChatError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn thread_depth_six_is_rejected() {
        let store = store();
        let creator = UserId::new();
        let chat = store.create_chat("general", ChatType::Group, creator, &[]).unwrap();
        let mut parent = store.create_thread(&chat.id, creator, None, None, Some("t0".to_string()), false).unwrap();
        for i in 1..=5 {
            parent = store
                .create_thread(&chat.id, creator, None, Some(parent.id), Some(format!("t{i}")), false)
                .unwrap();
        }
        assert_eq!(parent.depth, 5);
        let err = store
            .create_thread(&chat.id, creator, None, Some(parent.id), Some("t6".to_string()), false)
            .unwrap_err();
        assert!(matches!(err, ChatError::PreconditionFailed(_)));
    }
}
