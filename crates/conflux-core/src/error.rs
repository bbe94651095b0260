use thiserror::Error;

/// Canonical error kinds shared by every core and by the gateway's RES/error
/// frames. Each variant maps to one wire error code via `code()`.
#[derive(Debug, Error)]
pub enum ConfluxError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ConfluxError {
    /// Short error code sent to clients in HTTP error bodies and WS error frames.
    pub fn code(&self) -> &'static str {
        match self {
            ConfluxError::InvalidArgument(_) => "invalid_argument",
            ConfluxError::Unauthenticated(_) => "unauthenticated",
            ConfluxError::PermissionDenied(_) => "permission_denied",
            ConfluxError::NotFound(_) => "not_found",
            ConfluxError::Conflict(_) => "conflict",
            ConfluxError::PreconditionFailed(_) => "precondition_failed",
            ConfluxError::Unavailable(_) => "unavailable",
            ConfluxError::Database(_) => "internal",
            ConfluxError::Serialization(_) => "invalid_argument",
            ConfluxError::Io(_) => "internal",
            ConfluxError::PayloadTooLarge { .. } => "invalid_argument",
            ConfluxError::Internal(_) => "internal",
        }
    }

    /// HTTP status that best matches this error's code.
    pub fn status_code(&self) -> u16 {
        match self.code() {
            "invalid_argument" => 400,
            "unauthenticated" => 401,
            "permission_denied" => 403,
            "not_found" => 404,
            "conflict" => 409,
            "precondition_failed" => 412,
            "unavailable" => 503,
            _ => 500,
        }
    }
}

impl From<rusqlite::Error> for ConfluxError {
    fn from(e: rusqlite::Error) -> Self {
        ConfluxError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfluxError>;
