use thiserror::Error;

/// Why a cached record was rejected.
///
/// Rejection is never surfaced to adapter callers; it turns into a miss and
/// a warning.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Payload shorter than its fixed header.
    #[error("record truncated: {len} bytes, need at least {need}")]
    Truncated { len: usize, need: usize },

    /// Header tag not present in the format registry.
    #[error("unknown record format tag {0}")]
    UnknownFormat(i32),

    /// Header magic does not match the registered format.
    #[error("format {tag}: magic mismatch (expected {expected:#010x}, found {found:#010x})")]
    MagicMismatch { tag: i32, expected: u32, found: u32 },

    /// Fixed-size record with the wrong length.
    #[error("{kind} record has invalid length {len}")]
    InvalidLength { kind: &'static str, len: usize },

    /// Content list without its leading magic number.
    #[error("content list magic {0:#010x} not recognized")]
    BadMagic(u32),

    /// Alternate-id list with an undecodable tail.
    #[error("malformed identifier list: {0}")]
    MalformedIds(String),
}
