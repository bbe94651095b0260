use std::str::FromStr;

use chrono::{DateTime, Utc};
use conflux_core::types::{
    ChatId, ChatType, FileLinkId, MessageId, ParticipantRole, SeqNum, ThreadId, ThreadType, UserId,
};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{ChatError, Result};
use crate::types::{Chat, ChatParticipant, Message, Reaction, Thread};

/// Initialise every Chat Core table. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chats (
            id          TEXT PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            chat_type   TEXT NOT NULL,
            created_by  TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS chat_participants (
            chat_id    TEXT NOT NULL REFERENCES chats(id),
            user_id    TEXT NOT NULL,
            role       TEXT NOT NULL,
            joined_at  TEXT NOT NULL,
            PRIMARY KEY (chat_id, user_id)
         );
         CREATE INDEX IF NOT EXISTS idx_chat_participants_user ON chat_participants(user_id);

         CREATE TABLE IF NOT EXISTS messages (
            id                         TEXT PRIMARY KEY NOT NULL,
            chat_id                    TEXT NOT NULL REFERENCES chats(id),
            sender_id                  TEXT,
            content                    TEXT NOT NULL,
            sent_at                    TEXT NOT NULL,
            updated_at                 TEXT,
            parent_id                  TEXT,
            thread_id                  TEXT,
            reply_to_ids               TEXT NOT NULL DEFAULT '[]',
            forwarded_from_message_id  TEXT,
            forwarded_from_chat_id     TEXT,
            file_link_ids              TEXT NOT NULL DEFAULT '[]',
            is_system                  INTEGER NOT NULL DEFAULT 0,
            is_deleted                 INTEGER NOT NULL DEFAULT 0,
            is_moderated_deletion      INTEGER NOT NULL DEFAULT 0,
            seq_num                    INTEGER NOT NULL
         );
         CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_chat_seq ON messages(chat_id, seq_num);
         CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id);

         CREATE TABLE IF NOT EXISTS threads (
            id                      TEXT PRIMARY KEY NOT NULL,
            chat_id                 TEXT NOT NULL REFERENCES chats(id),
            parent_message_id       TEXT,
            parent_thread_id        TEXT,
            thread_type             TEXT NOT NULL,
            title                   TEXT,
            created_by              TEXT,
            depth                   INTEGER NOT NULL DEFAULT 0,
            restricted_participants INTEGER NOT NULL DEFAULT 0,
            is_archived             INTEGER NOT NULL DEFAULT 0,
            created_at              TEXT NOT NULL
         );
         -- one system thread per chat
         CREATE UNIQUE INDEX IF NOT EXISTS idx_threads_one_system_per_chat
            ON threads(chat_id) WHERE thread_type = 'system';
         -- CreateThread idempotency: a second call for the same reply target
         -- returns the existing row
         CREATE UNIQUE INDEX IF NOT EXISTS idx_threads_reply_idempotent
            ON threads(chat_id, parent_message_id) WHERE parent_message_id IS NOT NULL;

         CREATE TABLE IF NOT EXISTS thread_participants (
            thread_id TEXT NOT NULL REFERENCES threads(id),
            user_id   TEXT NOT NULL,
            PRIMARY KEY (thread_id, user_id)
         );

         CREATE TABLE IF NOT EXISTS reactions (
            message_id TEXT NOT NULL REFERENCES messages(id),
            user_id    TEXT NOT NULL,
            emoji      TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id, emoji)
         );

         CREATE TABLE IF NOT EXISTS read_status (
            message_id TEXT NOT NULL REFERENCES messages(id),
            user_id    TEXT NOT NULL,
            read_at    TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
         );

         -- Chat Core's binding to the two Files Core groups created at chat
         -- creation.
         CREATE TABLE IF NOT EXISTS chat_file_groups (
            chat_id  TEXT NOT NULL REFERENCES chats(id),
            role     TEXT NOT NULL,
            group_id TEXT NOT NULL,
            PRIMARY KEY (chat_id, role)
         );
        ",
    )?;
    Ok(())
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn json_ids<T: FromStr>(s: &str) -> Vec<T> {
    serde_json::from_str::<Vec<String>>(s)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|x| T::from_str(&x).ok())
        .collect()
}

fn ids_json<T: ToString>(ids: &[T]) -> String {
    serde_json::to_string(&ids.iter().map(|i| i.to_string()).collect::<Vec<_>>()).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: ChatId(row.get::<_, String>(0)?.parse().unwrap_or_default()),
        name: row.get(1)?,
        chat_type: ChatType::from_str(&row.get::<_, String>(2)?).unwrap_or(ChatType::Group),
        created_by: UserId(row.get::<_, String>(3)?.parse().unwrap_or_default()),
        created_at: parse_ts(row.get::<_, String>(4)?),
        updated_at: parse_ts(row.get::<_, String>(5)?),
    })
}

pub(crate) fn row_to_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatParticipant> {
    Ok(ChatParticipant {
        chat_id: ChatId(row.get::<_, String>(0)?.parse().unwrap_or_default()),
        user_id: UserId(row.get::<_, String>(1)?.parse().unwrap_or_default()),
        role: ParticipantRole::from_str(&row.get::<_, String>(2)?).unwrap_or(ParticipantRole::Member),
        joined_at: parse_ts(row.get::<_, String>(3)?),
    })
}

pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId(row.get::<_, String>(0)?.parse().unwrap_or_default()),
        chat_id: ChatId(row.get::<_, String>(1)?.parse().unwrap_or_default()),
        sender_id: row
            .get::<_, Option<String>>(2)?
            .and_then(|s| s.parse().ok())
            .map(UserId),
        content: row.get(3)?,
        sent_at: parse_ts(row.get::<_, String>(4)?),
        updated_at: row.get::<_, Option<String>>(5)?.map(parse_ts),
        parent_id: row.get::<_, Option<String>>(6)?.and_then(|s| s.parse().ok()).map(MessageId),
        thread_id: row.get::<_, Option<String>>(7)?.and_then(|s| s.parse().ok()).map(ThreadId),
        reply_to_ids: json_ids(&row.get::<_, String>(8)?),
        forwarded_from_message_id: row.get::<_, Option<String>>(9)?.and_then(|s| s.parse().ok()).map(MessageId),
        forwarded_from_chat_id: row.get::<_, Option<String>>(10)?.and_then(|s| s.parse().ok()).map(ChatId),
        file_link_ids: json_ids(&row.get::<_, String>(11)?),
        is_system: row.get::<_, i64>(12)? != 0,
        is_deleted: row.get::<_, i64>(13)? != 0,
        is_moderated_deletion: row.get::<_, i64>(14)? != 0,
        seq_num: SeqNum(row.get(15)?),
    })
}

pub(crate) fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<Thread> {
    Ok(Thread {
        id: ThreadId(row.get::<_, String>(0)?.parse().unwrap_or_default()),
        chat_id: ChatId(row.get::<_, String>(1)?.parse().unwrap_or_default()),
        parent_message_id: row.get::<_, Option<String>>(2)?.and_then(|s| s.parse().ok()).map(MessageId),
        parent_thread_id: row.get::<_, Option<String>>(3)?.and_then(|s| s.parse().ok()).map(ThreadId),
        thread_type: ThreadType::from_str(&row.get::<_, String>(4)?).unwrap_or(ThreadType::User),
        title: row.get(5)?,
        created_by: row.get::<_, Option<String>>(6)?.and_then(|s| s.parse().ok()).map(UserId),
        depth: row.get::<_, i64>(7)? as u8,
        restricted_participants: row.get::<_, i64>(8)? != 0,
        is_archived: row.get::<_, i64>(9)? != 0,
        created_at: parse_ts(row.get::<_, String>(10)?),
    })
}

const MESSAGE_SELECT_SQL: &str = "SELECT id, chat_id, sender_id, content, sent_at, updated_at, parent_id,
    thread_id, reply_to_ids, forwarded_from_message_id, forwarded_from_chat_id, file_link_ids,
    is_system, is_deleted, is_moderated_deletion, seq_num FROM messages";

pub fn insert_chat(conn: &Connection, chat: &Chat) -> Result<()> {
    conn.execute(
        "INSERT INTO chats (id, name, chat_type, created_by, created_at, updated_at) VALUES (?1,?2,?3,?4,?5,?6)",
        params![
            chat.id.to_string(),
            chat.name,
            chat.chat_type.to_string(),
            chat.created_by.to_string(),
            chat.created_at.to_rfc3339(),
            chat.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_chat(conn: &Connection, chat_id: &ChatId) -> Result<Option<Chat>> {
    conn.query_row(
        "SELECT id, name, chat_type, created_by, created_at, updated_at FROM chats WHERE id = ?1",
        params![chat_id.to_string()],
        row_to_chat,
    )
    .optional()
    .map_err(ChatError::from)
}

pub fn list_chats_for_user(conn: &Connection, user_id: &UserId, page: u32, count: u32) -> Result<Vec<Chat>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.chat_type, c.created_by, c.created_at, c.updated_at
         FROM chats c JOIN chat_participants p ON p.chat_id = c.id
         WHERE p.user_id = ?1
         ORDER BY c.updated_at DESC
         LIMIT ?2 OFFSET ?3",
    )?;
    let offset = (page as i64) * (count as i64);
    let rows = stmt
        .query_map(params![user_id.to_string(), count, offset], row_to_chat)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn insert_participant(conn: &Connection, p: &ChatParticipant) -> Result<()> {
    conn.execute(
        "INSERT INTO chat_participants (chat_id, user_id, role, joined_at) VALUES (?1,?2,?3,?4)",
        params![
            p.chat_id.to_string(),
            p.user_id.to_string(),
            p.role.to_string(),
            p.joined_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_participant(conn: &Connection, chat_id: &ChatId, user_id: &UserId) -> Result<Option<ChatParticipant>> {
    conn.query_row(
        "SELECT chat_id, user_id, role, joined_at FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
        params![chat_id.to_string(), user_id.to_string()],
        row_to_participant,
    )
    .optional()
    .map_err(ChatError::from)
}

pub fn list_participants(conn: &Connection, chat_id: &ChatId) -> Result<Vec<ChatParticipant>> {
    let mut stmt = conn.prepare(
        "SELECT chat_id, user_id, role, joined_at FROM chat_participants WHERE chat_id = ?1",
    )?;
    let rows = stmt
        .query_map(params![chat_id.to_string()], row_to_participant)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn count_admins(conn: &Connection, chat_id: &ChatId) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM chat_participants WHERE chat_id = ?1 AND role = 'admin'",
        params![chat_id.to_string()],
        |r| r.get(0),
    )
    .map_err(ChatError::from)
}

pub fn remove_participant(conn: &Connection, chat_id: &ChatId, user_id: &UserId) -> Result<()> {
    conn.execute(
        "DELETE FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
        params![chat_id.to_string(), user_id.to_string()],
    )?;
    Ok(())
}

pub fn update_participant_role(conn: &Connection, chat_id: &ChatId, user_id: &UserId, role: ParticipantRole) -> Result<()> {
    conn.execute(
        "UPDATE chat_participants SET role = ?1 WHERE chat_id = ?2 AND user_id = ?3",
        params![role.to_string(), chat_id.to_string(), user_id.to_string()],
    )?;
    Ok(())
}

pub fn next_seq_num(conn: &Connection, chat_id: &ChatId) -> Result<SeqNum> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(seq_num) FROM messages WHERE chat_id = ?1",
        params![chat_id.to_string()],
        |r| r.get(0),
    )?;
    Ok(SeqNum(max.unwrap_or(0) + 1))
}

pub fn insert_message(conn: &Connection, m: &Message) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, chat_id, sender_id, content, sent_at, updated_at, parent_id, thread_id,
            reply_to_ids, forwarded_from_message_id, forwarded_from_chat_id, file_link_ids,
            is_system, is_deleted, is_moderated_deletion, seq_num)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
        params![
            m.id.to_string(),
            m.chat_id.to_string(),
            m.sender_id.map(|u| u.to_string()),
            m.content,
            m.sent_at.to_rfc3339(),
            m.updated_at.map(|t| t.to_rfc3339()),
            m.parent_id.map(|i| i.to_string()),
            m.thread_id.map(|i| i.to_string()),
            ids_json(&m.reply_to_ids),
            m.forwarded_from_message_id.map(|i| i.to_string()),
            m.forwarded_from_chat_id.map(|i| i.to_string()),
            ids_json(&m.file_link_ids),
            m.is_system as i64,
            m.is_deleted as i64,
            m.is_moderated_deletion as i64,
            m.seq_num.0,
        ],
    )?;
    Ok(())
}

pub fn get_message(conn: &Connection, message_id: &MessageId) -> Result<Option<Message>> {
    conn.query_row(
        &format!("{MESSAGE_SELECT_SQL} WHERE id = ?1"),
        params![message_id.to_string()],
        row_to_message,
    )
    .optional()
    .map_err(ChatError::from)
}

pub fn update_message_content(conn: &Connection, message_id: &MessageId, content: &str) -> Result<()> {
    conn.execute(
        "UPDATE messages SET content = ?1, updated_at = ?2 WHERE id = ?3",
        params![content, Utc::now().to_rfc3339(), message_id.to_string()],
    )?;
    Ok(())
}

pub fn soft_delete_message(conn: &Connection, message_id: &MessageId, moderated: bool) -> Result<()> {
    conn.execute(
        "UPDATE messages SET is_deleted = 1, is_moderated_deletion = ?1, updated_at = ?2 WHERE id = ?3",
        params![moderated as i64, Utc::now().to_rfc3339(), message_id.to_string()],
    )?;
    Ok(())
}

/// `ListMessages` — paginated, descending by `sent_at`.
pub fn list_messages(conn: &Connection, chat_id: &ChatId, page: u32, count: u32) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "{MESSAGE_SELECT_SQL} WHERE chat_id = ?1 ORDER BY sent_at DESC LIMIT ?2 OFFSET ?3"
    ))?;
    let offset = (page as i64) * (count as i64);
    let rows = stmt
        .query_map(params![chat_id.to_string(), count, offset], row_to_message)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// `SyncMessages(chat_id, after_seq, limit)` — ascending by `seq_num`,
/// the offline-sync primitive.
pub fn sync_messages(conn: &Connection, chat_id: &ChatId, after_seq: i64, limit: u32) -> Result<(Vec<Message>, bool)> {
    let mut stmt = conn.prepare(&format!(
        "{MESSAGE_SELECT_SQL} WHERE chat_id = ?1 AND seq_num > ?2 ORDER BY seq_num ASC LIMIT ?3"
    ))?;
    let messages: Vec<Message> = stmt
        .query_map(params![chat_id.to_string(), after_seq, (limit as i64) + 1], row_to_message)?
        .filter_map(|r| r.ok())
        .collect();
    let has_more = messages.len() as u32 > limit;
    let messages = messages.into_iter().take(limit as usize).collect();
    Ok((messages, has_more))
}

pub fn list_thread_messages(conn: &Connection, thread_id: &ThreadId) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!("{MESSAGE_SELECT_SQL} WHERE thread_id = ?1 ORDER BY seq_num ASC"))?;
    let rows = stmt
        .query_map(params![thread_id.to_string()], row_to_message)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn insert_thread(conn: &Connection, t: &Thread) -> Result<()> {
    conn.execute(
        "INSERT INTO threads (id, chat_id, parent_message_id, parent_thread_id, thread_type, title,
            created_by, depth, restricted_participants, is_archived, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
        params![
            t.id.to_string(),
            t.chat_id.to_string(),
            t.parent_message_id.map(|i| i.to_string()),
            t.parent_thread_id.map(|i| i.to_string()),
            t.thread_type.to_string(),
            t.title,
            t.created_by.map(|u| u.to_string()),
            t.depth as i64,
            t.restricted_participants as i64,
            t.is_archived as i64,
            t.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

const THREAD_SELECT_SQL: &str = "SELECT id, chat_id, parent_message_id, parent_thread_id, thread_type, title,
    created_by, depth, restricted_participants, is_archived, created_at FROM threads";

pub fn get_thread(conn: &Connection, thread_id: &ThreadId) -> Result<Option<Thread>> {
    conn.query_row(
        &format!("{THREAD_SELECT_SQL} WHERE id = ?1"),
        params![thread_id.to_string()],
        row_to_thread,
    )
    .optional()
    .map_err(ChatError::from)
}

pub fn get_thread_by_parent_message(conn: &Connection, chat_id: &ChatId, parent_message_id: &MessageId) -> Result<Option<Thread>> {
    conn.query_row(
        &format!("{THREAD_SELECT_SQL} WHERE chat_id = ?1 AND parent_message_id = ?2"),
        params![chat_id.to_string(), parent_message_id.to_string()],
        row_to_thread,
    )
    .optional()
    .map_err(ChatError::from)
}

pub fn get_system_thread(conn: &Connection, chat_id: &ChatId) -> Result<Option<Thread>> {
    conn.query_row(
        &format!("{THREAD_SELECT_SQL} WHERE chat_id = ?1 AND thread_type = 'system'"),
        params![chat_id.to_string()],
        row_to_thread,
    )
    .optional()
    .map_err(ChatError::from)
}

pub fn archive_thread(conn: &Connection, thread_id: &ThreadId) -> Result<()> {
    conn.execute(
        "UPDATE threads SET is_archived = 1 WHERE id = ?1",
        params![thread_id.to_string()],
    )?;
    Ok(())
}

pub fn add_thread_participant(conn: &Connection, thread_id: &ThreadId, user_id: &UserId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO thread_participants (thread_id, user_id) VALUES (?1,?2)",
        params![thread_id.to_string(), user_id.to_string()],
    )?;
    Ok(())
}

pub fn is_thread_participant(conn: &Connection, thread_id: &ThreadId, user_id: &UserId) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM thread_participants WHERE thread_id = ?1 AND user_id = ?2",
        params![thread_id.to_string(), user_id.to_string()],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_reaction(conn: &Connection, r: &Reaction) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO reactions (message_id, user_id, emoji) VALUES (?1,?2,?3)",
        params![r.message_id.to_string(), r.user_id.to_string(), r.emoji],
    )?;
    Ok(())
}

pub fn remove_reaction(conn: &Connection, message_id: &MessageId, user_id: &UserId, emoji: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
        params![message_id.to_string(), user_id.to_string(), emoji],
    )?;
    Ok(())
}

pub fn list_reactions(conn: &Connection, message_id: &MessageId) -> Result<Vec<Reaction>> {
    let mut stmt = conn.prepare("SELECT message_id, user_id, emoji FROM reactions WHERE message_id = ?1")?;
    let rows = stmt
        .query_map(params![message_id.to_string()], |row| {
            Ok(Reaction {
                message_id: MessageId(row.get::<_, String>(0)?.parse().unwrap_or_default()),
                user_id: UserId(row.get::<_, String>(1)?.parse().unwrap_or_default()),
                emoji: row.get(2)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn mark_read(conn: &Connection, message_id: &MessageId, user_id: &UserId) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO read_status (message_id, user_id, read_at) VALUES (?1,?2,?3)",
        params![message_id.to_string(), user_id.to_string(), Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn set_chat_file_group(conn: &Connection, chat_id: &ChatId, role: &str, group_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO chat_file_groups (chat_id, role, group_id) VALUES (?1,?2,?3)",
        params![chat_id.to_string(), role, group_id],
    )?;
    Ok(())
}

pub fn get_chat_file_groups(conn: &Connection, chat_id: &ChatId) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT role, group_id FROM chat_file_groups WHERE chat_id = ?1")?;
    let rows = stmt
        .query_map(params![chat_id.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn touch_chat(conn: &Connection, chat_id: &ChatId) -> Result<()> {
    conn.execute(
        "UPDATE chats SET updated_at = ?1 WHERE id = ?2",
        params![Utc::now().to_rfc3339(), chat_id.to_string()],
    )?;
    Ok(())
}
