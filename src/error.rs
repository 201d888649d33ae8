use std::io;
use thiserror::Error;

use crate::thumbnail::GenerationError;

/// Failures of the container codec itself. Every variant is a deterministic
/// function of the input; nothing here is worth retrying.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u16),
    #[error("Malformed header: {0}")]
    MalformedHeader(String),
    #[error("Truncated input: need {needed} bytes, have {available}")]
    TruncatedInput { needed: usize, available: usize },
    #[error("Unknown key: {0}")]
    UnknownKey(String),
    #[error("Key is a scalar, not a segment: {0}")]
    NotASegment(String),
    /// The allocator under-estimated the serialized header. This is a bug in
    /// the estimate, never a property of the caller's data.
    #[error("Header allocation exceeded: allocated {allocated} B, header needs {actual} B")]
    HeaderAllocationExceeded { allocated: usize, actual: usize },
    #[error("Header of {0} B does not fit the 16-bit length field")]
    HeaderTooLarge(usize),
    #[error("Scalar '{0}' looks like a segment range and would not survive a read")]
    AmbiguousScalar(String),
    #[error("Scalar '{0}' carries the segment prefix")]
    PrefixedScalar(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ContainerError {
    pub(crate) fn truncated(needed: usize, available: usize) -> Self {
        ContainerError::TruncatedInput { needed, available }
    }
}

/// Top-level error of the store/load pipeline.
#[derive(Error, Debug)]
pub enum ThumberError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("Thumbnail generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
