use thiserror::Error;

/// User-directory errors. Kept separate from `ConfluxError` so the gateway
/// maps them to wire error codes explicitly rather than coupling layers.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("user not found: {0}")]
    NotFound(String),

    #[error("user already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

pub type Result<T> = std::result::Result<T, UserError>;

impl From<UserError> for conflux_core::ConfluxError {
    fn from(e: UserError) -> Self {
        use conflux_core::ConfluxError as E;
        match e {
            UserError::NotFound(m) => E::NotFound(m),
            UserError::AlreadyExists(m) => E::Conflict(m),
            UserError::DatabaseError(e) => E::Database(e.to_string()),
            UserError::PermissionDenied(m) => E::PermissionDenied(m),
        }
    }
}
