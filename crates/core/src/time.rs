//! UTC time grid.
//!
//! All time arithmetic in the system happens on a UTC millisecond grid.
//! [`UtcInstant`] wraps milliseconds since the Unix epoch and provides the
//! two rounding operators the batch-release protocol is built on
//! ([`UtcInstant::bucket_start`] and [`UtcInstant::next_bucket`]) plus the
//! conversion to the GAEN "10-minute intervals since epoch" representation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use time::macros::format_description;
use time::{Duration, OffsetDateTime, Time};

/// Length of one GAEN rolling interval (10 minutes) in milliseconds.
pub const TEN_MINUTES_MS: i64 = 600_000;

/// One UTC day expressed in rolling intervals.
pub const INTERVALS_PER_DAY: i32 = 144;

/// An instant on the UTC millisecond grid.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct UtcInstant(i64);

impl UtcInstant {
    /// Current wall-clock time. Prefer going through a [`Clock`] so tests
    /// can pin time.
    pub fn now() -> Self {
        Self::from(OffsetDateTime::now_utc())
    }

    /// Construct from milliseconds since the Unix epoch.
    pub const fn from_epoch_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Construct from a GAEN 10-minute interval index.
    pub fn from_ten_minute_interval(interval: u32) -> Self {
        Self(i64::from(interval) * TEN_MINUTES_MS)
    }

    /// Milliseconds since the Unix epoch.
    pub const fn timestamp_millis(self) -> i64 {
        self.0
    }

    /// The 10-minute interval index of this instant, rounding toward zero.
    /// Negative instants have no interval representation.
    pub fn ten_minute_interval(self) -> Result<u32> {
        if self.0 < 0 {
            return Err(Error::TimestampOutOfRange(self.0));
        }
        u32::try_from(self.0 / TEN_MINUTES_MS).map_err(|_| Error::TimestampOutOfRange(self.0))
    }

    /// Start of the release bucket containing this instant.
    pub fn bucket_start(self, bucket: Duration) -> Self {
        let width = bucket.whole_milliseconds() as i64;
        Self(self.0.div_euclid(width) * width)
    }

    /// Start of the release bucket after the one containing this instant.
    pub fn next_bucket(self, bucket: Duration) -> Self {
        let width = bucket.whole_milliseconds() as i64;
        Self((self.0.div_euclid(width) + 1) * width)
    }

    /// Whether this instant sits exactly on a bucket boundary.
    pub fn is_bucket_aligned(self, bucket: Duration) -> bool {
        let width = bucket.whole_milliseconds() as i64;
        self.0.rem_euclid(width) == 0
    }

    /// Midnight UTC of the day containing this instant.
    pub fn day_start(self) -> Self {
        self.bucket_start(Duration::days(1))
    }

    /// The UTC calendar date of this instant.
    pub fn date(self) -> time::Date {
        OffsetDateTime::from(self).date()
    }

    pub fn plus(self, d: Duration) -> Self {
        Self(self.0 + d.whole_milliseconds() as i64)
    }

    pub fn minus(self, d: Duration) -> Self {
        Self(self.0 - d.whole_milliseconds() as i64)
    }

    /// RFC 1123 rendering with a literal `GMT` zone, as used in HTTP
    /// `Expires` headers (e.g. `Mon, 29 Jun 2020 00:00:00 GMT`).
    pub fn to_rfc1123(self) -> String {
        const FORMAT: &[time::format_description::BorrowedFormatItem<'static>] = format_description!(
            "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
        );
        OffsetDateTime::from(self)
            .format(FORMAT)
            .expect("rfc1123 formatting of a valid instant cannot fail")
    }
}

impl From<OffsetDateTime> for UtcInstant {
    fn from(value: OffsetDateTime) -> Self {
        Self((value.unix_timestamp_nanos() / 1_000_000) as i64)
    }
}

impl From<UtcInstant> for OffsetDateTime {
    fn from(value: UtcInstant) -> Self {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(value.0) * 1_000_000)
            .expect("millisecond instant is representable")
    }
}

impl fmt::Display for UtcInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of the current time, passed through request state so tests can
/// pin the clock without process-global mutation.
pub trait Clock: Send + Sync {
    fn now(&self) -> UtcInstant;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcInstant {
        UtcInstant::now()
    }
}

/// A settable clock for tests.
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn at(instant: UtcInstant) -> Self {
        Self {
            millis: AtomicI64::new(instant.timestamp_millis()),
        }
    }

    /// Move the clock to a new instant.
    pub fn set(&self, instant: UtcInstant) {
        self.millis.store(instant.timestamp_millis(), Ordering::SeqCst);
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, d: Duration) {
        self.millis
            .fetch_add(d.whole_milliseconds() as i64, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> UtcInstant {
        UtcInstant::from_epoch_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// The next occurrence of `time_of_day` (UTC) strictly after `now`.
pub fn next_occurrence(now: UtcInstant, time_of_day: Time) -> UtcInstant {
    let now_dt = OffsetDateTime::from(now);
    let candidate = now_dt.replace_time(time_of_day);
    if candidate > now_dt {
        UtcInstant::from(candidate)
    } else {
        UtcInstant::from(candidate + Duration::days(1))
    }
}
