//! Export assembly error types.

use thiserror::Error;

/// Export assembly errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("key parsing error: {0}")]
    KeyParsing(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("filter construction failed at {0} entries")]
    FilterFull(usize),

    #[error("invalid filter encoding: {0}")]
    FilterEncoding(String),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for export operations.
pub type ExportResult<T> = std::result::Result<T, ExportError>;
