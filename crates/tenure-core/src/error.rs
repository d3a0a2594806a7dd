use thiserror::Error;

/// Core error type for tenure operations.
#[derive(Error, Debug)]
pub enum TenureError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("lost leadership with no error")]
    LeadershipLost,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for TenureError {
    fn from(e: serde_json::Error) -> Self {
        TenureError::Serialization(e.to_string())
    }
}

/// Result type alias using TenureError.
pub type Result<T> = std::result::Result<T, TenureError>;
