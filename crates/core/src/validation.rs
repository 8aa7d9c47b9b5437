//! Key and time-window checks shared by the upload and download paths.

use crate::error::{Error, Result};
use crate::tek::{MAX_ROLLING_PERIOD, TemporaryExposureKey};
use crate::time::UtcInstant;
use time::Duration;

/// Validation utilities parameterized with the deployment's key size,
/// retention window, release bucket width and accepted clock skew.
#[derive(Clone, Debug)]
pub struct ValidationUtils {
    key_size_bytes: usize,
    retention: Duration,
    release_bucket: Duration,
    time_skew: Duration,
}

impl ValidationUtils {
    pub fn new(
        key_size_bytes: usize,
        retention: Duration,
        release_bucket: Duration,
        time_skew: Duration,
    ) -> Self {
        Self {
            key_size_bytes,
            retention,
            release_bucket,
            time_skew,
        }
    }

    /// The decoded `keyData` must have exactly the configured length.
    pub fn is_valid_key_format(&self, key: &TemporaryExposureKey) -> bool {
        key.key_data.len() == self.key_size_bytes
    }

    pub fn assert_key_format(&self, key: &TemporaryExposureKey) -> Result<()> {
        if self.is_valid_key_format(key) {
            Ok(())
        } else {
            Err(Error::BadKeyFormat(format!(
                "expected {} bytes of key data, got {}",
                self.key_size_bytes,
                key.key_data.len()
            )))
        }
    }

    /// A batch release time is acceptable when it lies inside the retention
    /// window, is not in the future, and sits on a bucket boundary.
    pub fn is_valid_batch_release_time(&self, since: UtcInstant, now: UtcInstant) -> bool {
        since >= now.minus(self.retention)
            && since <= now
            && since.is_bucket_aligned(self.release_bucket)
    }

    /// Whether the key's validity window lies entirely beyond retention.
    pub fn is_before_retention(&self, key: &TemporaryExposureKey, now: UtcInstant) -> bool {
        key.expires_at() < now.minus(self.retention)
    }

    /// Whether the key starts beyond the accepted clock skew.
    pub fn is_in_future(&self, key: &TemporaryExposureKey, now: UtcInstant) -> bool {
        key.starts_at() > now.plus(self.time_skew)
    }

    pub fn is_valid_rolling_period(&self, key: &TemporaryExposureKey) -> bool {
        key.rolling_period >= 1 && key.rolling_period <= MAX_ROLLING_PERIOD
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn release_bucket(&self) -> Duration {
        self.release_bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TEN_MINUTES_MS;

    fn utils() -> ValidationUtils {
        ValidationUtils::new(
            16,
            Duration::days(14),
            Duration::hours(2),
            Duration::hours(2),
        )
    }

    fn key_at(now: UtcInstant, offset: Duration) -> TemporaryExposureKey {
        let start = now.plus(offset);
        TemporaryExposureKey {
            key_data: vec![1u8; 16],
            rolling_start_number: (start.timestamp_millis() / TEN_MINUTES_MS) as u32,
            rolling_period: 144,
            transmission_risk_level: 0,
            fake: 0,
            origin: None,
            report_type: None,
            days_since_onset_of_symptoms: None,
        }
    }

    #[test]
    fn key_format_checks_decoded_length() {
        let u = utils();
        let now = UtcInstant::from_epoch_millis(1_600_000_000_000);
        let mut k = key_at(now, Duration::ZERO);
        assert!(u.is_valid_key_format(&k));
        assert!(u.assert_key_format(&k).is_ok());

        k.key_data = vec![1u8; 15];
        assert!(!u.is_valid_key_format(&k));
        assert!(matches!(
            u.assert_key_format(&k),
            Err(Error::BadKeyFormat(_))
        ));
    }

    #[test]
    fn batch_release_time_window_and_alignment() {
        let u = utils();
        let bucket = Duration::hours(2);
        let now = UtcInstant::from_epoch_millis(1_600_000_000_000);
        let aligned = now.bucket_start(bucket);

        assert!(u.is_valid_batch_release_time(aligned, now));
        assert!(!u.is_valid_batch_release_time(aligned.plus(Duration::milliseconds(1)), now));
        assert!(!u.is_valid_batch_release_time(now.next_bucket(bucket), now));
        assert!(!u.is_valid_batch_release_time(
            aligned.minus(Duration::days(15)).bucket_start(bucket),
            now
        ));
    }

    #[test]
    fn retention_cutoff_uses_window_end() {
        let u = utils();
        let now = UtcInstant::from_epoch_millis(1_600_000_000_000);

        // Starts 15 days ago but the window end is also beyond retention.
        let expired = key_at(now, Duration::days(-15));
        assert!(u.is_before_retention(&expired, now));

        let fresh = key_at(now, Duration::days(-13));
        assert!(!u.is_before_retention(&fresh, now));
    }

    #[test]
    fn future_keys_respect_skew() {
        let u = utils();
        let now = UtcInstant::from_epoch_millis(1_600_000_000_000);

        assert!(!u.is_in_future(&key_at(now, Duration::hours(1)), now));
        assert!(u.is_in_future(&key_at(now, Duration::hours(3)), now));
    }

    #[test]
    fn rolling_period_bounds() {
        let u = utils();
        let now = UtcInstant::from_epoch_millis(1_600_000_000_000);
        let mut k = key_at(now, Duration::ZERO);

        for valid in [1, 72, 144] {
            k.rolling_period = valid;
            assert!(u.is_valid_rolling_period(&k));
        }
        for invalid in [0, -1, 145] {
            k.rolling_period = invalid;
            assert!(!u.is_valid_rolling_period(&k));
        }
    }
}
