use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use conflux_core::types::{FileAccess, FileGroupId, FileId, FileLinkId, FileStatus, ShareToken, UserId};
use rusqlite::Connection;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db;
use crate::error::{FilesError, Result};
use crate::types::{File, FileGroup, FileLink, FileLinkPermission, FileShareLink, ShareLinkOpts};

/// Files Core: content storage, link indirection, group/individual ACL
/// evaluation and share-token issuance.
pub struct FilesStore {
    conn: Arc<Mutex<Connection>>,
    storage_root: PathBuf,
}

impl FilesStore {
    pub fn new(conn: Arc<Mutex<Connection>>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            conn,
            storage_root: storage_root.into(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("files connection poisoned")
    }

    /// `CheckFileAccess(link_id, user_id)` — the supremum over group-derived
    /// and individual permissions, falling back to individual-only when
    /// group tables are empty.
    #[instrument(skip(self))]
    pub fn check_access(&self, link_id: &FileLinkId, user_id: &UserId) -> Result<FileAccess> {
        let conn = self.lock();
        let group_access = if db::any_group_exists(&conn)? {
            db::group_flags_for_user(&conn, link_id, user_id)?
                .map(|g| crate::types::access_from_group_flags(g.can_read, g.can_delete, g.can_transfer))
                .unwrap_or(FileAccess::None)
        } else {
            FileAccess::None
        };

        let individual_access = db::get_individual_permission(&conn, link_id, user_id)?
            .map(|p| crate::types::access_from_individual_flags(p.can_view, p.can_download, p.can_delete))
            .unwrap_or(FileAccess::None);

        Ok(group_access.max(individual_access))
    }

    /// `Upload(filename, content_type, size, stream, uploader)`.
    /// Writes bytes under `YYYY/MM/DD/<random>_<sanitized-name>`; a failed
    /// write after bytes are partially flushed triggers cleanup before the
    /// error propagates.
    #[instrument(skip(self, bytes))]
    pub async fn upload(
        &self,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
        uploader: UserId,
    ) -> Result<(FileId, FileLinkId)> {
        let storage_path = self.compute_storage_path(filename);
        let abs_path = self.storage_root.join(&storage_path);
        if let Some(parent) = abs_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if let Err(e) = tokio::fs::write(&abs_path, bytes).await {
            let _ = tokio::fs::remove_file(&abs_path).await;
            return Err(FilesError::Storage(e));
        }

        let file = File {
            id: FileId::new(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len() as i64,
            storage_path: storage_path.clone(),
            uploaded_by: uploader,
            status: FileStatus::Active,
            created_at: Utc::now(),
        };

        let link = FileLink {
            id: FileLinkId::new(),
            file_id: file.id,
            uploaded_by: uploader,
            is_deleted: false,
            created_at: Utc::now(),
        };

        let write_result: Result<()> = {
            let conn = self.lock();
            db::insert_file(&conn, &file)?;
            db::insert_link(&conn, &link)?;
            db::insert_permission(
                &conn,
                &FileLinkPermission {
                    file_link_id: link.id,
                    user_id: uploader,
                    can_view: true,
                    can_download: true,
                    can_delete: true,
                },
            )?;
            Ok(())
        };

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&abs_path).await;
            return Err(e);
        }

        info!(file_id = %file.id, link_id = %link.id, "file uploaded");
        Ok((file.id, link.id))
    }

    /// `Download(link_id, user)` — requires `read`; `link.is_deleted ⇒
    /// not_found`.
    #[instrument(skip(self))]
    pub async fn download(&self, link_id: &FileLinkId, user: &UserId) -> Result<(File, Vec<u8>)> {
        let (file, link) = {
            let conn = self.lock();
            let link = db::get_link(&conn, link_id)?
                .ok_or_else(|| FilesError::NotFound(link_id.to_string()))?;
            if link.is_deleted {
                return Err(FilesError::NotFound(link_id.to_string()));
            }
            let file = db::get_file(&conn, &link.file_id)?
                .ok_or_else(|| FilesError::NotFound(link.file_id.to_string()))?;
            (file, link)
        };

        if self.check_access(&link.id, user)? < FileAccess::Read {
            return Err(FilesError::PermissionDenied(user.to_string()));
        }

        let abs_path = self.storage_root.join(&file.storage_path);
        let bytes = tokio::fs::read(&abs_path).await?;
        Ok((file, bytes))
    }

    /// `Delete(link_id, user)` — requires `delete`; soft-deletes the link
    ///.
    #[instrument(skip(self))]
    pub fn delete(&self, link_id: &FileLinkId, user: &UserId) -> Result<()> {
        if self.check_access(link_id, user)? < FileAccess::Delete {
            return Err(FilesError::PermissionDenied(user.to_string()));
        }
        let conn = self.lock();
        db::soft_delete_link(&conn, link_id)?;
        Ok(())
    }

    /// `CreateFileLink(file_id, actor)` — a new link to existing content,
    /// used by Chat Core's forward path.
    #[instrument(skip(self))]
    pub fn create_file_link(&self, file_id: FileId, actor: UserId) -> Result<FileLinkId> {
        let conn = self.lock();
        if db::get_file(&conn, &file_id)?.is_none() {
            return Err(FilesError::NotFound(file_id.to_string()));
        }
        let link = FileLink {
            id: FileLinkId::new(),
            file_id,
            uploaded_by: actor,
            is_deleted: false,
            created_at: Utc::now(),
        };
        db::insert_link(&conn, &link)?;
        db::insert_permission(
            &conn,
            &FileLinkPermission {
                file_link_id: link.id,
                user_id: actor,
                can_view: true,
                can_download: true,
                can_delete: true,
            },
        )?;
        Ok(link.id)
    }

    /// As above, but reuses an already-held connection lock — for callers
    /// (Chat Core's forward path) that must run inside the same transaction
    /// as the message insert.
    pub fn create_file_link_with_conn(conn: &Connection, file_id: FileId, actor: UserId) -> Result<FileLinkId> {
        if db::get_file(conn, &file_id)?.is_none() {
            return Err(FilesError::NotFound(file_id.to_string()));
        }
        let link = FileLink {
            id: FileLinkId::new(),
            file_id,
            uploaded_by: actor,
            is_deleted: false,
            created_at: Utc::now(),
        };
        db::insert_link(conn, &link)?;
        db::insert_permission(
            conn,
            &FileLinkPermission {
                file_link_id: link.id,
                user_id: actor,
                can_view: true,
                can_download: true,
                can_delete: true,
            },
        )?;
        Ok(link.id)
    }

    /// `CreateFileGroup`. `with_conn` variant lets Chat Core
    /// create a chat's `moderate`/`read` groups inside the chat-creation
    /// transaction.
    pub fn create_group(
        &self,
        name: &str,
        can_read: bool,
        can_delete: bool,
        can_transfer: bool,
    ) -> Result<FileGroup> {
        let conn = self.lock();
        Self::create_group_with_conn(&conn, name, can_read, can_delete, can_transfer)
    }

    pub fn create_group_with_conn(
        conn: &Connection,
        name: &str,
        can_read: bool,
        can_delete: bool,
        can_transfer: bool,
    ) -> Result<FileGroup> {
        let group = FileGroup {
            id: FileGroupId::new(),
            name: name.to_string(),
            can_read,
            can_delete,
            can_transfer,
        };
        db::insert_group(conn, &group)?;
        Ok(group)
    }

    pub fn delete_group(&self, group_id: &FileGroupId) -> Result<()> {
        let conn = self.lock();
        db::delete_group(&conn, group_id)
    }

    pub fn add_user_to_group(&self, group_id: &FileGroupId, user_id: &UserId) -> Result<()> {
        let conn = self.lock();
        db::add_user_to_group(&conn, group_id, user_id)
    }

    pub fn add_user_to_group_with_conn(conn: &Connection, group_id: &FileGroupId, user_id: &UserId) -> Result<()> {
        db::add_user_to_group(conn, group_id, user_id)
    }

    pub fn remove_user_from_group(&self, group_id: &FileGroupId, user_id: &UserId) -> Result<()> {
        let conn = self.lock();
        db::remove_user_from_group(&conn, group_id, user_id)
    }

    pub fn add_file_link_to_groups(&self, link_id: &FileLinkId, group_ids: &[FileGroupId]) -> Result<()> {
        let conn = self.lock();
        Self::add_file_link_to_groups_with_conn(&conn, link_id, group_ids)
    }

    pub fn add_file_link_to_groups_with_conn(
        conn: &Connection,
        link_id: &FileLinkId,
        group_ids: &[FileGroupId],
    ) -> Result<()> {
        for group_id in group_ids {
            db::add_link_to_group(conn, link_id, group_id)?;
        }
        Ok(())
    }

    /// `RemoveUserFromAllGroupFiles(groups, user)` — the leave-chat
    /// primitive.
    #[instrument(skip(self))]
    pub fn remove_user_from_all_group_files(&self, group_ids: &[FileGroupId], user_id: &UserId) -> Result<()> {
        let conn = self.lock();
        db::remove_user_from_all_group_files(&conn, group_ids, user_id)
    }

    pub fn remove_user_from_all_group_files_with_conn(
        conn: &Connection,
        group_ids: &[FileGroupId],
        user_id: &UserId,
    ) -> Result<()> {
        db::remove_user_from_all_group_files(conn, group_ids, user_id)
    }

    /// `CreateShareLink(file_id, user, opts)` — requires `view` on some
    /// link for the file.
    #[instrument(skip(self, opts))]
    pub fn create_share_link(&self, file_id: FileId, user: UserId, opts: ShareLinkOpts) -> Result<FileShareLink> {
        let conn = self.lock();
        if db::get_file(&conn, &file_id)?.is_none() {
            return Err(FilesError::NotFound(file_id.to_string()));
        }
        if !db::any_link_permission_grants_view(&conn, &file_id, &user)? {
            return Err(FilesError::PermissionDenied(user.to_string()));
        }

        let password_hash = opts
            .password
            .as_deref()
            .map(hash_password)
            .transpose()?;

        let share = FileShareLink {
            id: Uuid::new_v4().to_string(),
            file_id,
            token: ShareToken::new(),
            password_hash,
            max_downloads: opts.max_downloads,
            download_count: 0,
            expires_at: opts.expires_at,
            is_active: true,
            created_at: Utc::now(),
        };
        db::insert_share_link(&conn, &share)?;
        Ok(share)
    }

    /// `DownloadByShareToken(token, password)` — validates password (if
    /// set), expiry, download cap; increments the counter atomically
    ///.
    #[instrument(skip(self, password))]
    pub async fn download_by_share_token(&self, token: &str, password: Option<&str>) -> Result<(File, Vec<u8>)> {
        let (share, file) = {
            let conn = self.lock();
            let share = db::get_share_link_by_token(&conn, token)?.ok_or(FilesError::ShareLinkInvalid)?;
            if !share.is_active {
                return Err(FilesError::ShareLinkInvalid);
            }
            if let Some(expires_at) = share.expires_at {
                if expires_at <= Utc::now() {
                    return Err(FilesError::ShareLinkInvalid);
                }
            }
            if let Some(max) = share.max_downloads {
                if share.download_count >= max {
                    return Err(FilesError::ShareDownloadLimitReached);
                }
            }
            let file = db::get_file(&conn, &share.file_id)?.ok_or(FilesError::ShareLinkInvalid)?;
            (share, file)
        };

        if let Some(hash) = &share.password_hash {
            match password {
                None => return Err(FilesError::SharePasswordRequired),
                Some(pw) => {
                    if !verify_password(pw, hash)? {
                        return Err(FilesError::SharePasswordIncorrect);
                    }
                }
            }
        }

        let incremented = {
            let conn = self.lock();
            db::increment_share_download_count(&conn, &share.id)?
        };
        if !incremented {
            return Err(FilesError::ShareDownloadLimitReached);
        }

        let abs_path = self.storage_root.join(&file.storage_path);
        let bytes = tokio::fs::read(&abs_path).await?;
        Ok((file, bytes))
    }

    /// Compute `YYYY/MM/DD/<random>_<sanitized-name>`. The service is
    /// authoritative for this path; callers never supply or manipulate it
    ///.
    fn compute_storage_path(&self, filename: &str) -> String {
        let now = Utc::now();
        let sanitized = sanitize_filename(filename);
        let random: String = Uuid::new_v4().to_string().replace('-', "");
        format!(
            "{}/{}_{}",
            now.format("%Y/%m/%d"),
            &random[..12],
            sanitized
        )
    }
}

fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| FilesError::PasswordHash(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| FilesError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (FilesStore, tempfile_dir::TempDir) {
        let conn = Connection::open_in_memory().unwrap();
        db::init_db(&conn).unwrap();
        let dir = tempfile_dir::TempDir::new();
        (FilesStore::new(Arc::new(Mutex::new(conn)), dir.path()), dir)
    }

    #[tokio::test]
    async fn upload_then_download_round_trips_bytes() {
        let (store, _dir) = store();
        let uploader = UserId::new();
        let (_file_id, link_id) = store
            .upload("report.pdf", "application/pdf", b"hello world", uploader)
            .await
            .unwrap();

        let (file, bytes) = store.download(&link_id, &uploader).await.unwrap();
        assert_eq!(bytes, b"hello world");
        assert_eq!(file.filename, "report.pdf");
    }

    #[tokio::test]
    async fn download_after_soft_delete_is_not_found() {
        let (store, _dir) = store();
        let uploader = UserId::new();
        let (_file_id, link_id) = store.upload("a.txt", "text/plain", b"x", uploader).await.unwrap();
        store.delete(&link_id, &uploader).unwrap();
        let err = store.download(&link_id, &uploader).await.unwrap_err();
        assert!(matches!(err, FilesError::NotFound(_)));
    }

    #[tokio::test]
    async fn non_member_has_no_access() {
        let (store, _dir) = store();
        let uploader = UserId::new();
        let stranger = UserId::new();
        let (_file_id, link_id) = store.upload("a.txt", "text/plain", b"x", uploader).await.unwrap();
        assert_eq!(store.check_access(&link_id, &stranger).unwrap(), FileAccess::None);
    }

    #[tokio::test]
    async fn group_membership_grants_read_even_without_individual_permission() {
        let (store, _dir) = store();
        let uploader = UserId::new();
        let member = UserId::new();
        let (file_id, link_id) = store.upload("a.txt", "text/plain", b"x", uploader).await.unwrap();

        let group = store.create_group("read", true, false, false).unwrap();
        store.add_user_to_group(&group.id, &member).unwrap();
        store.add_file_link_to_groups(&link_id, &[group.id]).unwrap();

        assert_eq!(store.check_access(&link_id, &member).unwrap(), FileAccess::Read);
        let _ = file_id;
    }

    #[tokio::test]
    async fn leaving_revokes_group_and_individual_access() {
        let (store, _dir) = store();
        let uploader = UserId::new();
        let member = UserId::new();
        let (_file_id, link_id) = store.upload("a.txt", "text/plain", b"x", uploader).await.unwrap();

        let group = store.create_group("read", true, false, false).unwrap();
        store.add_user_to_group(&group.id, &member).unwrap();
        store.add_file_link_to_groups(&link_id, &[group.id]).unwrap();
        assert_eq!(store.check_access(&link_id, &member).unwrap(), FileAccess::Read);

        store.remove_user_from_all_group_files(&[group.id], &member).unwrap();
        assert_eq!(store.check_access(&link_id, &member).unwrap(), FileAccess::None);
    }

    #[tokio::test]
    async fn share_link_requires_correct_password() {
        let (store, _dir) = store();
        let uploader = UserId::new();
        let (file_id, _link_id) = store.upload("a.txt", "text/plain", b"x", uploader).await.unwrap();

        let share = store
            .create_share_link(
                file_id,
                uploader,
                ShareLinkOpts {
                    password: Some("s3cret".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let err = store.download_by_share_token(&share.token.0, None).await.unwrap_err();
        assert!(matches!(err, FilesError::SharePasswordRequired));

        let err = store
            .download_by_share_token(&share.token.0, Some("wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, FilesError::SharePasswordIncorrect));

        let (file, bytes) = store
            .download_by_share_token(&share.token.0, Some("s3cret"))
            .await
            .unwrap();
        assert_eq!(bytes, b"x");
        assert_eq!(file.id, file_id);
    }

    #[tokio::test]
    async fn share_link_download_cap_is_enforced() {
        let (store, _dir) = store();
        let uploader = UserId::new();
        let (file_id, _link_id) = store.upload("a.txt", "text/plain", b"x", uploader).await.unwrap();
        let share = store
            .create_share_link(
                file_id,
                uploader,
                ShareLinkOpts {
                    max_downloads: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();

        store.download_by_share_token(&share.token.0, None).await.unwrap();
        let err = store.download_by_share_token(&share.token.0, None).await.unwrap_err();
        assert!(matches!(err, FilesError::ShareDownloadLimitReached));
    }
}

/// Minimal temp-dir helper so tests don't need an extra dev-dependency
/// for file I/O.
#[cfg(test)]
mod tempfile_dir {
    use std::path::{Path, PathBuf};

    pub struct TempDir(PathBuf);

    impl TempDir {
        pub fn new() -> Self {
            let path = std::env::temp_dir().join(format!("conflux-files-test-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&path).unwrap();
            Self(path)
        }

        pub fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }
}
