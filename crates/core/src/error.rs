//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("bad key format: {0}")]
    BadKeyFormat(String),

    #[error("invalid rolling period: {0}")]
    InvalidRollingPeriod(i32),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("bad batch release time: {0}")]
    BadBatchReleaseTime(i64),

    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(i64),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
