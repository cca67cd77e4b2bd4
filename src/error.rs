//! Error types for the history ingestion job

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session is locked by another process")]
    SessionLocked,

    #[error("Failed to acquire session lock: {0}")]
    LockError(String),

    #[error("Invalid session token: {0}")]
    InvalidSession(String),

    #[error("Telegram API error: {0}")]
    TelegramError(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("MySQL error: {0}")]
    MySqlError(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Interrupted by {0}")]
    Interrupted(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<grammers_client::InvocationError> for Error {
    fn from(err: grammers_client::InvocationError) -> Self {
        Error::TelegramError(err.to_string())
    }
}

impl From<mysql_async::Error> for Error {
    fn from(err: mysql_async::Error) -> Self {
        Error::MySqlError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::InvalidSession(err.to_string())
    }
}
