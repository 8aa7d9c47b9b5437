//! Temporary Exposure Key model and upload request bodies.

use crate::time::{TEN_MINUTES_MS, UtcInstant};
use serde::{Deserialize, Serialize};
use time::Duration;

/// Upper bound for a rolling period: 144 ten-minute slots, one UTC day.
pub const MAX_ROLLING_PERIOD: i32 = 144;

/// A Temporary Exposure Key as broadcast by GAEN clients.
///
/// `key_data` travels base64-encoded on the wire and is held decoded here;
/// the configured key size (16 bytes) is enforced by the insert pipeline,
/// not at parse time, so that a malformed key yields the protocol's
/// `BadKeyFormat` error instead of a generic deserialization failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryExposureKey {
    #[serde(rename = "keyData", with = "base64_bytes")]
    pub key_data: Vec<u8>,

    /// Count of 10-minute intervals since the Unix epoch at which the key
    /// became active.
    #[serde(rename = "rollingStartNumber")]
    pub rolling_start_number: u32,

    /// Validity length in 10-minute slots. Legacy Android clients send 0,
    /// which an optional modifier rewrites to 144.
    #[serde(rename = "rollingPeriod")]
    pub rolling_period: i32,

    /// Opaque 0..8 risk value; stored and forwarded untouched.
    #[serde(rename = "transmissionRiskLevel", default)]
    pub transmission_risk_level: i32,

    /// 0/1 indicator; fake keys are accepted but never stored.
    #[serde(default)]
    pub fake: i32,

    /// Federation origin country (ISO-3166 alpha-2), stamped by the insert
    /// pipeline when absent.
    #[serde(rename = "countryOrigin", default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Federation report type (1..4).
    #[serde(rename = "reportType", default, skip_serializing_if = "Option::is_none")]
    pub report_type: Option<i32>,

    #[serde(
        rename = "daysSinceOnsetOfSymptoms",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub days_since_onset_of_symptoms: Option<i32>,
}

impl TemporaryExposureKey {
    /// First instant of the key's validity window.
    pub fn starts_at(&self) -> UtcInstant {
        UtcInstant::from_ten_minute_interval(self.rolling_start_number)
    }

    /// First instant past the key's validity window.
    pub fn expires_at(&self) -> UtcInstant {
        self.starts_at()
            .plus(Duration::milliseconds(i64::from(self.rolling_period.max(0)) * TEN_MINUTES_MS))
    }

    pub fn is_fake(&self) -> bool {
        self.fake != 0
    }
}

/// V1 upload body: keys plus the start-of-day interval whose key the client
/// will upload tomorrow through the next-day endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GaenRequest {
    #[serde(rename = "gaenKeys")]
    pub gaen_keys: Vec<TemporaryExposureKey>,

    /// 10-minute interval index of the start of the delayed key's day.
    #[serde(rename = "delayedKeyDate")]
    pub delayed_key_date: u32,
}

/// Body for the V1 next-day endpoint: exactly one key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GaenSecondDay {
    #[serde(rename = "delayedKey")]
    pub delayed_key: TemporaryExposureKey,
}

/// V2 / V2-UMA upload body: keys only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GaenV2UploadKeysRequest {
    #[serde(rename = "gaenKeys")]
    pub gaen_keys: Vec<TemporaryExposureKey>,
}

/// Serde adapter: `Vec<u8>` as standard base64.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
