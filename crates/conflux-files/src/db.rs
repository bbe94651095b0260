use std::str::FromStr;

use chrono::{DateTime, Utc};
use conflux_core::types::{FileGroupId, FileId, FileLinkId, FileStatus, ShareToken, UserId};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{FilesError, Result};
use crate::types::{File, FileGroup, FileLink, FileLinkPermission, FileShareLink};

/// Initialise every Files Core table. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS files (
            id            TEXT PRIMARY KEY NOT NULL,
            filename      TEXT NOT NULL,
            content_type  TEXT NOT NULL,
            size          INTEGER NOT NULL,
            storage_path  TEXT NOT NULL,
            uploaded_by   TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'active',
            created_at    TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS file_links (
            id           TEXT PRIMARY KEY NOT NULL,
            file_id      TEXT NOT NULL REFERENCES files(id),
            uploaded_by  TEXT NOT NULL,
            is_deleted   INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_file_links_file_id ON file_links(file_id);

         CREATE TABLE IF NOT EXISTS file_groups (
            id           TEXT PRIMARY KEY NOT NULL,
            name         TEXT NOT NULL,
            can_read     INTEGER NOT NULL DEFAULT 0,
            can_delete   INTEGER NOT NULL DEFAULT 0,
            can_transfer INTEGER NOT NULL DEFAULT 0
         );

         CREATE TABLE IF NOT EXISTS file_group_members (
            group_id TEXT NOT NULL REFERENCES file_groups(id),
            user_id  TEXT NOT NULL,
            PRIMARY KEY (group_id, user_id)
         );
         CREATE INDEX IF NOT EXISTS idx_file_group_members_user ON file_group_members(user_id);

         CREATE TABLE IF NOT EXISTS file_link_groups (
            file_link_id TEXT NOT NULL REFERENCES file_links(id),
            group_id     TEXT NOT NULL REFERENCES file_groups(id),
            PRIMARY KEY (file_link_id, group_id)
         );
         CREATE INDEX IF NOT EXISTS idx_file_link_groups_group ON file_link_groups(group_id);

         CREATE TABLE IF NOT EXISTS file_link_permissions (
            file_link_id TEXT NOT NULL REFERENCES file_links(id),
            user_id      TEXT NOT NULL,
            can_view     INTEGER NOT NULL DEFAULT 0,
            can_download INTEGER NOT NULL DEFAULT 0,
            can_delete   INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (file_link_id, user_id)
         );
         CREATE INDEX IF NOT EXISTS idx_file_link_permissions_user ON file_link_permissions(user_id);

         CREATE TABLE IF NOT EXISTS file_share_links (
            id             TEXT PRIMARY KEY NOT NULL,
            file_id        TEXT NOT NULL REFERENCES files(id),
            token          TEXT NOT NULL UNIQUE,
            password_hash  TEXT,
            max_downloads  INTEGER,
            download_count INTEGER NOT NULL DEFAULT 0,
            expires_at     TEXT,
            is_active      INTEGER NOT NULL DEFAULT 1,
            created_at     TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_file_share_links_token ON file_share_links(token);
        ",
    )?;
    Ok(())
}

pub(crate) fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<File> {
    let status_str: String = row.get(6)?;
    Ok(File {
        id: FileId(row.get::<_, String>(0)?.parse().unwrap_or_default()),
        filename: row.get(1)?,
        content_type: row.get(2)?,
        size: row.get(3)?,
        storage_path: row.get(4)?,
        uploaded_by: UserId(row.get::<_, String>(5)?.parse().unwrap_or_default()),
        status: FileStatus::from_str(&status_str).unwrap_or(FileStatus::Active),
        created_at: parse_ts(row.get::<_, String>(7)?),
    })
}

pub(crate) fn row_to_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileLink> {
    Ok(FileLink {
        id: FileLinkId(row.get::<_, String>(0)?.parse().unwrap_or_default()),
        file_id: FileId(row.get::<_, String>(1)?.parse().unwrap_or_default()),
        uploaded_by: UserId(row.get::<_, String>(2)?.parse().unwrap_or_default()),
        is_deleted: row.get::<_, i64>(3)? != 0,
        created_at: parse_ts(row.get::<_, String>(4)?),
    })
}

pub(crate) fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileGroup> {
    Ok(FileGroup {
        id: FileGroupId(row.get::<_, String>(0)?.parse().unwrap_or_default()),
        name: row.get(1)?,
        can_read: row.get::<_, i64>(2)? != 0,
        can_delete: row.get::<_, i64>(3)? != 0,
        can_transfer: row.get::<_, i64>(4)? != 0,
    })
}

pub(crate) fn row_to_share_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileShareLink> {
    Ok(FileShareLink {
        id: row.get(0)?,
        file_id: FileId(row.get::<_, String>(1)?.parse().unwrap_or_default()),
        token: ShareToken(row.get(2)?),
        password_hash: row.get(3)?,
        max_downloads: row.get(4)?,
        download_count: row.get(5)?,
        expires_at: row.get::<_, Option<String>>(6)?.map(parse_ts),
        is_active: row.get::<_, i64>(7)? != 0,
        created_at: parse_ts(row.get::<_, String>(8)?),
    })
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const FILE_SELECT_SQL: &str = "SELECT id, filename, content_type, size, storage_path, uploaded_by, status, created_at FROM files WHERE id = ?1";
const LINK_SELECT_SQL: &str = "SELECT id, file_id, uploaded_by, is_deleted, created_at FROM file_links WHERE id = ?1";

pub fn insert_file(conn: &Connection, file: &File) -> Result<()> {
    conn.execute(
        "INSERT INTO files (id, filename, content_type, size, storage_path, uploaded_by, status, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            file.id.to_string(),
            file.filename,
            file.content_type,
            file.size,
            file.storage_path,
            file.uploaded_by.to_string(),
            file.status.to_string(),
            file.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_file(conn: &Connection, file_id: &FileId) -> Result<Option<File>> {
    conn.query_row(FILE_SELECT_SQL, params![file_id.to_string()], row_to_file)
        .optional()
        .map_err(FilesError::from)
}

pub fn insert_link(conn: &Connection, link: &FileLink) -> Result<()> {
    conn.execute(
        "INSERT INTO file_links (id, file_id, uploaded_by, is_deleted, created_at)
         VALUES (?1,?2,?3,?4,?5)",
        params![
            link.id.to_string(),
            link.file_id.to_string(),
            link.uploaded_by.to_string(),
            link.is_deleted as i64,
            link.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_link(conn: &Connection, link_id: &FileLinkId) -> Result<Option<FileLink>> {
    conn.query_row(LINK_SELECT_SQL, params![link_id.to_string()], row_to_link)
        .optional()
        .map_err(FilesError::from)
}

pub fn soft_delete_link(conn: &Connection, link_id: &FileLinkId) -> Result<()> {
    conn.execute(
        "UPDATE file_links SET is_deleted = 1 WHERE id = ?1",
        params![link_id.to_string()],
    )?;
    Ok(())
}

pub fn insert_permission(conn: &Connection, perm: &FileLinkPermission) -> Result<()> {
    conn.execute(
        "INSERT INTO file_link_permissions (file_link_id, user_id, can_view, can_download, can_delete)
         VALUES (?1,?2,?3,?4,?5)
         ON CONFLICT(file_link_id, user_id) DO UPDATE SET
            can_view = excluded.can_view,
            can_download = excluded.can_download,
            can_delete = excluded.can_delete",
        params![
            perm.file_link_id.to_string(),
            perm.user_id.to_string(),
            perm.can_view as i64,
            perm.can_download as i64,
            perm.can_delete as i64,
        ],
    )?;
    Ok(())
}

pub fn get_individual_permission(
    conn: &Connection,
    link_id: &FileLinkId,
    user_id: &UserId,
) -> Result<Option<FileLinkPermission>> {
    conn.query_row(
        "SELECT file_link_id, user_id, can_view, can_download, can_delete
         FROM file_link_permissions WHERE file_link_id = ?1 AND user_id = ?2",
        params![link_id.to_string(), user_id.to_string()],
        |row| {
            Ok(FileLinkPermission {
                file_link_id: FileLinkId(row.get::<_, String>(0)?.parse().unwrap_or_default()),
                user_id: UserId(row.get::<_, String>(1)?.parse().unwrap_or_default()),
                can_view: row.get::<_, i64>(2)? != 0,
                can_download: row.get::<_, i64>(3)? != 0,
                can_delete: row.get::<_, i64>(4)? != 0,
            })
        },
    )
    .optional()
    .map_err(FilesError::from)
}

pub fn insert_group(conn: &Connection, group: &FileGroup) -> Result<()> {
    conn.execute(
        "INSERT INTO file_groups (id, name, can_read, can_delete, can_transfer) VALUES (?1,?2,?3,?4,?5)",
        params![
            group.id.to_string(),
            group.name,
            group.can_read as i64,
            group.can_delete as i64,
            group.can_transfer as i64,
        ],
    )?;
    Ok(())
}

pub fn delete_group(conn: &Connection, group_id: &FileGroupId) -> Result<()> {
    conn.execute(
        "DELETE FROM file_group_members WHERE group_id = ?1",
        params![group_id.to_string()],
    )?;
    conn.execute(
        "DELETE FROM file_link_groups WHERE group_id = ?1",
        params![group_id.to_string()],
    )?;
    conn.execute("DELETE FROM file_groups WHERE id = ?1", params![group_id.to_string()])?;
    Ok(())
}

pub fn add_user_to_group(conn: &Connection, group_id: &FileGroupId, user_id: &UserId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO file_group_members (group_id, user_id) VALUES (?1,?2)",
        params![group_id.to_string(), user_id.to_string()],
    )?;
    Ok(())
}

pub fn remove_user_from_group(conn: &Connection, group_id: &FileGroupId, user_id: &UserId) -> Result<()> {
    conn.execute(
        "DELETE FROM file_group_members WHERE group_id = ?1 AND user_id = ?2",
        params![group_id.to_string(), user_id.to_string()],
    )?;
    Ok(())
}

pub fn add_link_to_group(conn: &Connection, link_id: &FileLinkId, group_id: &FileGroupId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO file_link_groups (file_link_id, group_id) VALUES (?1,?2)",
        params![link_id.to_string(), group_id.to_string()],
    )?;
    Ok(())
}

/// Groups a link belongs to, intersected with groups the user is a member
/// of — the group half of `CheckFileAccess`'s supremum.
pub fn group_flags_for_user(conn: &Connection, link_id: &FileLinkId, user_id: &UserId) -> Result<Option<FileGroup>> {
    let mut stmt = conn.prepare(
        "SELECT g.id, g.name, g.can_read, g.can_delete, g.can_transfer
         FROM file_groups g
         JOIN file_link_groups flg ON flg.group_id = g.id
         JOIN file_group_members m ON m.group_id = g.id AND m.user_id = ?2
         WHERE flg.file_link_id = ?1",
    )?;
    let groups: Vec<FileGroup> = stmt
        .query_map(params![link_id.to_string(), user_id.to_string()], row_to_group)?
        .filter_map(|r| r.ok())
        .collect();

    if groups.is_empty() {
        return Ok(None);
    }

    // Union of can_* flags across every matching group (spec: "taking the
    // union of can_* flags").
    let can_read = groups.iter().any(|g| g.can_read);
    let can_delete = groups.iter().any(|g| g.can_delete);
    let can_transfer = groups.iter().any(|g| g.can_transfer);
    Ok(Some(FileGroup {
        id: groups[0].id,
        name: String::new(),
        can_read,
        can_delete,
        can_transfer,
    }))
}

/// Whether any group row exists at all — used to detect the "group tables
/// empty" fallback condition.
pub fn any_group_exists(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM file_groups", [], |r| r.get(0))?;
    Ok(count > 0)
}

/// Revoke group membership and any individual view grant the user holds on
/// links belonging to the named groups.
pub fn remove_user_from_all_group_files(conn: &Connection, group_ids: &[FileGroupId], user_id: &UserId) -> Result<()> {
    for group_id in group_ids {
        remove_user_from_group(conn, group_id, user_id)?;
    }

    let placeholders: Vec<String> = group_ids.iter().map(|_| "?".to_string()).collect();
    if placeholders.is_empty() {
        return Ok(());
    }
    let sql = format!(
        "DELETE FROM file_link_permissions
         WHERE user_id = ? AND can_view = 1 AND file_link_id IN (
            SELECT file_link_id FROM file_link_groups WHERE group_id IN ({})
         )",
        placeholders.join(",")
    );
    let mut params_vec: Vec<String> = vec![user_id.to_string()];
    params_vec.extend(group_ids.iter().map(|g| g.to_string()));
    let param_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
    conn.execute(&sql, param_refs.as_slice())?;
    Ok(())
}

pub fn insert_share_link(conn: &Connection, link: &FileShareLink) -> Result<()> {
    conn.execute(
        "INSERT INTO file_share_links
            (id, file_id, token, password_hash, max_downloads, download_count, expires_at, is_active, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            link.id,
            link.file_id.to_string(),
            link.token.0,
            link.password_hash,
            link.max_downloads,
            link.download_count,
            link.expires_at.map(|t| t.to_rfc3339()),
            link.is_active as i64,
            link.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_share_link_by_token(conn: &Connection, token: &str) -> Result<Option<FileShareLink>> {
    conn.query_row(
        "SELECT id, file_id, token, password_hash, max_downloads, download_count, expires_at, is_active, created_at
         FROM file_share_links WHERE token = ?1",
        params![token],
        row_to_share_link,
    )
    .optional()
    .map_err(FilesError::from)
}

/// Atomically increment the download counter, gated on the link still
/// being under its download cap — affected-row-count tells the caller
/// whether the increment actually happened.
pub fn increment_share_download_count(conn: &Connection, id: &str) -> Result<bool> {
    let n = conn.execute(
        "UPDATE file_share_links SET download_count = download_count + 1
         WHERE id = ?1 AND is_active = 1
           AND (max_downloads IS NULL OR download_count < max_downloads)",
        params![id],
    )?;
    Ok(n > 0)
}

pub fn any_link_permission_grants_view(conn: &Connection, file_id: &FileId, user_id: &UserId) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM file_link_permissions p
         JOIN file_links l ON l.id = p.file_link_id
         WHERE l.file_id = ?1 AND p.user_id = ?2 AND p.can_view = 1",
        params![file_id.to_string(), user_id.to_string()],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}
