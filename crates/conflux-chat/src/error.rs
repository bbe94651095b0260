use thiserror::Error;

/// Chat Core errors. Converted into `ConfluxError` at the gateway boundary.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Files(#[from] conflux_files::FilesError),

    #[error(transparent)]
    Users(#[from] conflux_users::UserError),
}

pub type Result<T> = std::result::Result<T, ChatError>;

impl From<ChatError> for conflux_core::ConfluxError {
    fn from(e: ChatError) -> Self {
        use conflux_core::ConfluxError as E;
        match e {
            ChatError::NotFound(m) => E::NotFound(m),
            ChatError::PermissionDenied(m) => E::PermissionDenied(m),
            ChatError::InvalidArgument(m) => E::InvalidArgument(m),
            ChatError::Conflict(m) => E::Conflict(m),
            ChatError::PreconditionFailed(m) => E::PreconditionFailed(m),
            ChatError::Database(e) => E::Database(e.to_string()),
            ChatError::Files(e) => e.into(),
            ChatError::Users(e) => e.into(),
        }
    }
}
