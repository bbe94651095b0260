use thiserror::Error;

/// Voice Core errors. Converted into `ConfluxError` at the gateway boundary,
/// the same layering `conflux-chat::ChatError` keeps.
#[derive(Debug, Error)]
pub enum VoiceError {
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

    #[error("media engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Chat(#[from] conflux_chat::ChatError),
}

pub type Result<T> = std::result::Result<T, VoiceError>;

impl From<VoiceError> for conflux_core::ConfluxError {
    fn from(e: VoiceError) -> Self {
        use conflux_core::ConfluxError as E;
        match e {
            VoiceError::NotFound(m) => E::NotFound(m),
            VoiceError::PermissionDenied(m) => E::PermissionDenied(m),
            VoiceError::InvalidArgument(m) => E::InvalidArgument(m),
            VoiceError::Conflict(m) => E::Conflict(m),
            VoiceError::PreconditionFailed(m) => E::PreconditionFailed(m),
            VoiceError::EngineUnavailable(m) => E::Unavailable(m),
            VoiceError::Database(e) => E::Database(e.to_string()),
            VoiceError::Chat(e) => e.into(),
        }
    }
}
