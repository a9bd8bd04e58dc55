use thiserror::Error;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// The operation needs an active session.
    #[error("{0}")]
    NotStarted(String),

    /// Start or a configuration change was attempted while the session is active.
    #[error("{0}")]
    AlreadyStarted(String),

    #[error("Key \"{key}\" does not contain an indexed sequence to push value.")]
    NotASequence { key: String },

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    /// Whether this error means the session was not active.
    pub fn is_not_started(&self) -> bool {
        matches!(self, Self::NotStarted(_))
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Message used by every accessor that finds the session inactive.
pub const NOT_STARTED_MESSAGE: &str = "Session not started yet.";

/// Builds the error returned when an accessor runs without an active session.
pub fn not_started() -> SessionError {
    SessionError::NotStarted(NOT_STARTED_MESSAGE.to_string())
}
