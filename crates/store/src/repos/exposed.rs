//! Exposed-key repository.

use crate::error::StoreResult;
use async_trait::async_trait;
use lantern_core::{TemporaryExposureKey, UtcInstant};
use time::Duration;

/// Repository for exposed-key operations.
///
/// The download upper bound is always the start of the bucket containing
/// `now`: a row becomes publishable only once its release bucket has fully
/// closed, so every upload within a bucket shares a single tag.
#[async_trait]
pub trait ExposedKeyRepo: Send + Sync {
    /// Insert all keys atomically with the given release bucket and upload
    /// country. `(key_data, rolling_start_number)` conflicts are silently
    /// ignored so re-uploads are idempotent. Returns the inserted count.
    async fn upsert_exposed(
        &self,
        keys: &[TemporaryExposureKey],
        received_at: UtcInstant,
        country: &str,
    ) -> StoreResult<u64>;

    /// Keys with `since <= received_at < bucketStart(now)` whose validity
    /// window ended before `bucketStart(now)`, ordered by `key_data`
    /// ascending. The second condition delays a same-day key until the day
    /// after it was active, so a still-broadcasting key is never published.
    /// Country filters are set-membership on the upload country
    /// (`visited_countries`) and the federation origin
    /// (`origin_countries`); an empty list means "any".
    async fn get_sorted_exposed_since(
        &self,
        since: UtcInstant,
        now: UtcInstant,
        visited_countries: &[String],
        origin_countries: &[String],
    ) -> StoreResult<Vec<TemporaryExposureKey>>;

    /// Delete keys whose rolling start lies beyond the retention window.
    /// Returns the deleted count.
    async fn clean_exposed(&self, retention: Duration, now: UtcInstant) -> StoreResult<u64>;
}
