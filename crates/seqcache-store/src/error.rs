/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the filesystem (overflow files, store root).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by the embedded key-value engine.
    #[error("backend error: {0}")]
    Backend(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The primary key cannot be encoded as an entry key.
    #[error("invalid key {0:?}: keys must not contain NUL")]
    InvalidKey(String),

    /// Configuration could not be parsed or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
