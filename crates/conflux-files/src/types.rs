use chrono::{DateTime, Utc};
use conflux_core::types::{FileAccess, FileGroupId, FileId, FileLinkId, FileStatus, ShareToken, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: FileId,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub storage_path: String,
    pub uploaded_by: UserId,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
}

/// The unit of reference and sharing. Forwarding creates a new link to the
/// same `File` so deleting the original link never orphans the copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLink {
    pub id: FileLinkId,
    pub file_id: FileId,
    pub uploaded_by: UserId,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// A named bundle of `can_*` flags shared by every member. Chats create
/// exactly two of these on creation (`moderate`, `read`) and attach chat
/// file-links to both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileGroup {
    pub id: FileGroupId,
    pub name: String,
    pub can_read: bool,
    pub can_delete: bool,
    pub can_transfer: bool,
}

/// Per-`(link, user)` fallback grant, used when no group relationship
/// applies — share-link issuance, explicit one-off grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLinkPermission {
    pub file_link_id: FileLinkId,
    pub user_id: UserId,
    pub can_view: bool,
    pub can_download: bool,
    pub can_delete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileShareLink {
    pub id: String,
    pub file_id: FileId,
    pub token: ShareToken,
    pub password_hash: Option<String>,
    pub max_downloads: Option<i64>,
    pub download_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied knobs for `CreateShareLink`; the token itself is always
/// minted by the service, never accepted from the caller.
#[derive(Debug, Clone, Default)]
pub struct ShareLinkOpts {
    pub password: Option<String>,
    pub max_downloads: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub(crate) fn access_from_group_flags(can_read: bool, can_delete: bool, can_transfer: bool) -> FileAccess {
    if can_transfer {
        FileAccess::Transfer
    } else if can_delete {
        FileAccess::Delete
    } else if can_read {
        FileAccess::Read
    } else {
        FileAccess::None
    }
}

pub(crate) fn access_from_individual_flags(can_view: bool, can_download: bool, can_delete: bool) -> FileAccess {
    if can_delete {
        FileAccess::Delete
    } else if can_download || can_view {
        FileAccess::Read
    } else {
        FileAccess::None
    }
}
