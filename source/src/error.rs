use common::vcursor::CursorError;
use thiserror::Error;

/// Decode failure taxonomy shared by every format in the crate.
///
/// Structural errors in a required table ([`SourceError::Cursor`],
/// [`SourceError::MalformedHierarchy`], [`SourceError::ChecksumMismatch`])
/// abort the file they occur in. The rest are per-record: decoders isolate
/// them, keep going, and report them in the decode's diagnostics list.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error("{file}: bone {index} has malformed parent index {parent}")]
    MalformedHierarchy {
        file: &'static str,
        index: usize,
        parent: i32,
    },

    #[error("{file} checksum {actual:#010x} does not match model checksum {expected:#010x}")]
    ChecksumMismatch {
        file: &'static str,
        expected: i32,
        actual: i32,
    },

    #[error("{file}: unsupported {what}")]
    UnsupportedFeature { file: &'static str, what: String },

    #[error("asset not found on any mounted root: {path}")]
    MissingAsset { path: String },

    #[error("{file}: invalid {what}")]
    InvalidEncoding { file: &'static str, what: String },
}

pub type Result<T> = std::result::Result<T, SourceError>;
