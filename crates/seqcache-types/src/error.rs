use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid blob key: {0}")]
    InvalidBlobKey(String),

    #[error("invalid sequence id: {0}")]
    InvalidSeqId(String),
}
