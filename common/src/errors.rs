// Error handling framework
// Absence (empty queue, expired record) is never an error: it is an Ok(None).

use thiserror::Error;

/// Store primitive errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Redis error: {0}")]
    RedisError(String),

    #[error("Operation against a key holding the wrong kind of value: {0}")]
    WrongType(String),

    #[error("Value at key '{0}' is not an integer")]
    NotAnInteger(String),
}

/// Payload encoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Payload shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Payload serialization failed: {0}")]
    Serialization(String),

    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
}

/// Errors surfaced by the queue client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResqError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },
}

impl ResqError {
    /// True when the store could not be reached; the caller owns the retry policy.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ResqError::Store(StoreError::ConnectionFailed(_)))
    }

    /// True when a stored value could not be decoded.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            ResqError::Codec(CodecError::Malformed(_) | CodecError::ShapeMismatch(_))
        )
    }

    pub(crate) fn invalid_name(kind: &'static str, name: &str, reason: &str) -> Self {
        ResqError::InvalidName {
            kind,
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            return StoreError::ConnectionFailed(err.to_string());
        }

        match err.kind() {
            redis::ErrorKind::ExtensionError if err.code() == Some("WRONGTYPE") => {
                StoreError::WrongType(err.to_string())
            }
            _ => StoreError::RedisError(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for ResqError {
    fn from(err: redis::RedisError) -> Self {
        ResqError::Store(err.into())
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        use serde_json::error::Category;

        match err.classify() {
            Category::Data => CodecError::ShapeMismatch(err.to_string()),
            Category::Syntax | Category::Eof | Category::Io => {
                CodecError::Malformed(err.to_string())
            }
        }
    }
}
