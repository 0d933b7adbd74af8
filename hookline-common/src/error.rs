// ================================================================
// File: hookline-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found error: {0}")]
    NotFound(String),

    #[error("Session {0} is not connected")]
    NotConnected(i32),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid media: {0}")]
    InvalidMedia(String),

    #[error("Message content is empty")]
    EmptyMessage,

    /// A unique constraint fired (e.g. the (session_id, message_id) dedup key).
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Event bus error: {0}")]
    EventBus(String),
}

impl Error {
    /// True for input-validation failures the caller can fix by changing the request.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidRecipient(_)
                | Error::UnsupportedMediaType(_)
                | Error::InvalidMedia(_)
                | Error::EmptyMessage
                | Error::Duplicate(_)
                | Error::Parse(_)
        )
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<chrono::format::ParseError> for Error {
    fn from(err: chrono::format::ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}
