use thiserror::Error;

/// Files Core errors. Converted into `ConfluxError` at the gateway boundary,
/// the same layering `conflux-users::UserError` keeps separate from the
/// crate-wide error type.
#[derive(Debug, Error)]
pub enum FilesError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("share link invalid or expired")]
    ShareLinkInvalid,

    #[error("share link password required")]
    SharePasswordRequired,

    #[error("share link password incorrect")]
    SharePasswordIncorrect,

    #[error("share link download limit reached")]
    ShareDownloadLimitReached,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("password hashing error: {0}")]
    PasswordHash(String),
}

pub type Result<T> = std::result::Result<T, FilesError>;

impl From<FilesError> for conflux_core::ConfluxError {
    fn from(e: FilesError) -> Self {
        use conflux_core::ConfluxError as E;
        match e {
            FilesError::NotFound(m) => E::NotFound(m),
            FilesError::PermissionDenied(m) => E::PermissionDenied(m),
            FilesError::ShareLinkInvalid => E::NotFound("share link invalid or expired".to_string()),
            FilesError::SharePasswordRequired => E::PreconditionFailed("share link password required".to_string()),
            FilesError::SharePasswordIncorrect => E::PermissionDenied("share link password incorrect".to_string()),
            FilesError::ShareDownloadLimitReached => E::Conflict("share link download limit reached".to_string()),
            FilesError::Database(e) => E::Database(e.to_string()),
            FilesError::Storage(e) => E::Io(e),
            FilesError::PasswordHash(m) => E::Internal(m),
        }
    }
}
