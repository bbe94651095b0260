use std::str::FromStr;

use chrono::Utc;
use conflux_core::types::UserRole;
use rusqlite::{params, Connection, Result};

use crate::error::{Result as UserResult, UserError};
use crate::types::User;

/// Map a SELECT row (column order from `USER_SELECT_SQL`) to a `User`.
/// Centralised here so every query in this crate stays consistent.
pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let role = UserRole::from_str(&row.get::<_, String>(4)?).unwrap_or_default();
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        avatar_url: row.get(3)?,
        role,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Initialise the users table. Safe to call on every startup — CREATE IF
/// NOT EXISTS makes it idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id           TEXT PRIMARY KEY NOT NULL,
            username     TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            avatar_url   TEXT,
            role         TEXT NOT NULL DEFAULT 'user',
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL
        );",
    )
}

const USER_SELECT_SQL: &str =
    "SELECT id, username, display_name, avatar_url, role, created_at, updated_at
     FROM users WHERE id = ?1";

/// Create-or-update a directory entry — called by the upstream identity
/// system on signup and on profile/role change.
pub fn upsert_user(
    conn: &Connection,
    id: &str,
    username: &str,
    display_name: &str,
    avatar_url: Option<&str>,
    role: UserRole,
) -> UserResult<User> {
    let now = Utc::now().to_rfc3339();
    let existing = get_user(conn, id)?;
    let created_at = existing.map(|u| u.created_at).unwrap_or_else(|| now.clone());

    conn.execute(
        "INSERT INTO users (id, username, display_name, avatar_url, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            username = excluded.username,
            display_name = excluded.display_name,
            avatar_url = excluded.avatar_url,
            role = excluded.role,
            updated_at = excluded.updated_at",
        params![
            id,
            username,
            display_name,
            avatar_url,
            role.to_string(),
            created_at,
            now,
        ],
    )?;

    get_user(conn, id)?.ok_or_else(|| UserError::NotFound(id.to_string()))
}

/// Load a user by primary key. Returns `None` instead of an error when
/// absent so callers decide whether a miss is exceptional in their context.
pub fn get_user(conn: &Connection, user_id: &str) -> UserResult<Option<User>> {
    let mut stmt = conn.prepare(USER_SELECT_SQL)?;
    match stmt.query_row(params![user_id], row_to_user) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(UserError::DatabaseError(e)),
    }
}
