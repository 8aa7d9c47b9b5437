//! Database models mapping to the key store schema.

use lantern_core::{TemporaryExposureKey, UtcInstant};
use sqlx::FromRow;

/// Stored exposed key. `received_at` is the release bucket the server
/// assigned at insert time, not the true arrival instant.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct ExposedKeyRow {
    pub key_data: Vec<u8>,
    pub rolling_start_number: i64,
    pub rolling_period: i64,
    pub transmission_risk_level: i64,
    pub received_at: i64,
    pub country: String,
    pub origin: String,
    pub report_type: i64,
    pub days_since_onset_of_symptoms: Option<i64>,
}

impl ExposedKeyRow {
    /// Build a row from an upload-pipeline key.
    pub fn from_key(key: &TemporaryExposureKey, received_at: UtcInstant, country: &str) -> Self {
        Self {
            key_data: key.key_data.clone(),
            rolling_start_number: i64::from(key.rolling_start_number),
            rolling_period: i64::from(key.rolling_period),
            transmission_risk_level: i64::from(key.transmission_risk_level),
            received_at: received_at.timestamp_millis(),
            country: country.to_string(),
            origin: key.origin.clone().unwrap_or_default(),
            report_type: i64::from(key.report_type.unwrap_or_default()),
            days_since_onset_of_symptoms: key.days_since_onset_of_symptoms.map(i64::from),
        }
    }

    /// Convert back to the transport model.
    pub fn into_key(self) -> TemporaryExposureKey {
        TemporaryExposureKey {
            key_data: self.key_data,
            rolling_start_number: self.rolling_start_number as u32,
            rolling_period: self.rolling_period as i32,
            transmission_risk_level: self.transmission_risk_level as i32,
            fake: 0,
            origin: (!self.origin.is_empty()).then_some(self.origin),
            report_type: (self.report_type != 0).then_some(self.report_type as i32),
            days_since_onset_of_symptoms: self.days_since_onset_of_symptoms.map(|d| d as i32),
        }
    }
}

/// Single-use upload-token nonce.
#[derive(Debug, Clone, FromRow)]
pub struct RedeemRow {
    pub uuid: String,
    pub expiry: i64,
}

/// Scheduler lease record.
#[derive(Debug, Clone, FromRow)]
pub struct LeaseRow {
    pub name: String,
    pub lock_until: i64,
    pub locked_at: i64,
    pub locked_by: String,
}
