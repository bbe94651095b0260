use chrono::{DateTime, Utc};
use conflux_core::types::{
    ChatId, ChatType, FileLinkId, MessageId, ParticipantRole, SeqNum, ThreadId, ThreadType, UserId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub name: String,
    pub chat_type: ChatType,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatParticipant {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: Option<UserId>,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub parent_id: Option<MessageId>,
    pub thread_id: Option<ThreadId>,
    pub reply_to_ids: Vec<MessageId>,
    pub forwarded_from_message_id: Option<MessageId>,
    pub forwarded_from_chat_id: Option<ChatId>,
    pub file_link_ids: Vec<FileLinkId>,
    pub is_system: bool,
    pub is_deleted: bool,
    pub is_moderated_deletion: bool,
    pub seq_num: SeqNum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub chat_id: ChatId,
    pub parent_message_id: Option<MessageId>,
    pub parent_thread_id: Option<ThreadId>,
    pub thread_type: ThreadType,
    pub title: Option<String>,
    pub created_by: Option<UserId>,
    pub depth: u8,
    pub restricted_participants: bool,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadStatus {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub read_at: DateTime<Utc>,
}

/// Result of `SyncMessages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

/// Caller-supplied fields for `SendMessage`; `sender_id`/`is_system` are
/// never part of this struct — they're always derived by the store method
/// that's actually invoked (`send_message` vs `send_system_message`).
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub content: String,
    pub parent_id: Option<MessageId>,
    pub thread_id: Option<ThreadId>,
    pub reply_to_ids: Vec<MessageId>,
    pub file_link_ids: Vec<FileLinkId>,
}

pub const SYSTEM_THREAD_TITLE: &str = "Activity";
