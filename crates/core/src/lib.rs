//! Core domain types and shared logic for the lantern exposure-notification
//! backend.
//!
//! This crate defines the canonical data model used across all other crates:
//! - The UTC millisecond time grid and release-bucket rounding
//! - Temporary Exposure Keys and upload request bodies
//! - Key and time-window validation
//! - Application configuration

pub mod config;
pub mod error;
pub mod tek;
pub mod time;
pub mod validation;

pub use error::{Error, Result};
pub use tek::{
    GaenRequest, GaenSecondDay, GaenV2UploadKeysRequest, MAX_ROLLING_PERIOD, TemporaryExposureKey,
};
pub use time::{Clock, FixedClock, SystemClock, TEN_MINUTES_MS, UtcInstant};
pub use validation::ValidationUtils;
