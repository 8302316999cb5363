//! Error handling and custom error types
//!
//! Provides unified error handling across the relay using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Upload failed: {0}")]
    Upload(#[source] Box<Error>),

    #[error("Timed out after {millis}ms: {operation}")]
    Timeout { operation: String, millis: u64 },

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),
}

impl Error {
    pub fn upload(inner: Error) -> Self {
        Error::Upload(Box::new(inner))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
