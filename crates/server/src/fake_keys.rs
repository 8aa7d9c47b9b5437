//! Synthetic-key padding.
//!
//! To hide the true diagnosis count, the server keeps `amount` synthetic
//! keys per retained day and unions them into every export. They live in
//! their own in-memory store so the retention sweep never fights them and
//! real uploads cannot collide; the whole set is regenerated nightly.

use lantern_core::config::AppConfig;
use lantern_core::{TEN_MINUTES_MS, TemporaryExposureKey, UtcInstant};
use lantern_store::{ExposedKeyRepo, MemoryExposedStore, StoreResult};
use rand_core::{OsRng, RngCore};
use time::Duration;

/// Maintains the synthetic-key padding set.
pub struct FakeKeyService {
    store: MemoryExposedStore,
    enabled: bool,
    amount: u32,
    retention_days: u16,
    key_size_bytes: usize,
    country: String,
    origin: String,
    report_type: i32,
    release_bucket: Duration,
}

impl FakeKeyService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: MemoryExposedStore::new(config.gaen.release_bucket()),
            enabled: config.fake_keys.enabled,
            amount: config.fake_keys.amount,
            retention_days: config.gaen.retention_days,
            key_size_bytes: config.gaen.key_size_bytes,
            country: config.gaen.country.clone(),
            origin: config.federation.country_origin.clone(),
            report_type: config.federation.report_type,
            release_bucket: config.gaen.release_bucket(),
        }
    }

    /// Regenerate the padding set: `amount` fresh random keys for each of
    /// the past `retention_days` whole-day buckets. Returns the number of
    /// keys now stored.
    pub async fn update_fake_keys(&self, now: UtcInstant) -> StoreResult<u64> {
        if !self.enabled {
            return Ok(0);
        }

        self.store.clear().await;
        // Same release-bucket instant the insert pipeline assigns.
        let received_at = now
            .next_bucket(self.release_bucket)
            .minus(Duration::milliseconds(1));
        let mut total = 0u64;

        for day in 1..=i64::from(self.retention_days) {
            let day_start = now.minus(Duration::days(day)).day_start();
            let keys: Vec<TemporaryExposureKey> = (0..self.amount)
                .map(|_| self.generate_key(day_start))
                .collect();
            total += self
                .store
                .upsert_exposed(&keys, received_at, &self.country)
                .await?;
        }

        tracing::info!(keys = total, "Refreshed fake key padding");
        Ok(total)
    }

    /// Synthetic keys visible in the given download window, same contract
    /// as the real store.
    pub async fn exposed_since(
        &self,
        since: UtcInstant,
        now: UtcInstant,
        visited_countries: &[String],
        origin_countries: &[String],
    ) -> StoreResult<Vec<TemporaryExposureKey>> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        self.store
            .get_sorted_exposed_since(since, now, visited_countries, origin_countries)
            .await
    }

    /// A synthetic key is indistinguishable from a real one: random data,
    /// full-day period, `fake` cleared so it appears in exports.
    fn generate_key(&self, day_start: UtcInstant) -> TemporaryExposureKey {
        let mut key_data = vec![0u8; self.key_size_bytes];
        OsRng.fill_bytes(&mut key_data);

        TemporaryExposureKey {
            key_data,
            rolling_start_number: (day_start.timestamp_millis() / TEN_MINUTES_MS) as u32,
            rolling_period: 144,
            transmission_risk_level: 0,
            fake: 0,
            origin: Some(self.origin.clone()),
            report_type: Some(self.report_type),
            days_since_onset_of_symptoms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn service(enabled: bool) -> FakeKeyService {
        let mut config = AppConfig::for_testing();
        config.fake_keys.enabled = enabled;
        config.fake_keys.amount = 10;
        config.gaen.retention_days = 14;
        FakeKeyService::new(&config)
    }

    fn now() -> UtcInstant {
        UtcInstant::from_epoch_millis(1_600_000_000_000)
    }

    #[tokio::test]
    async fn disabled_service_produces_nothing() {
        let service = service(false);
        assert_eq!(service.update_fake_keys(now()).await.unwrap(), 0);
        assert!(
            service
                .exposed_since(UtcInstant::from_epoch_millis(0), now(), &[], &[])
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn generates_amount_times_retention_days_keys() {
        let service = service(true);
        assert_eq!(service.update_fake_keys(now()).await.unwrap(), 140);

        // A later refresh replaces, never accumulates.
        assert_eq!(service.update_fake_keys(now()).await.unwrap(), 140);
        assert_eq!(service.store.len().await, 140);
    }

    #[tokio::test]
    async fn keys_are_uncorrelated_across_days() {
        let service = service(true);
        service.update_fake_keys(now()).await.unwrap();

        let visible_at = now().plus(Duration::hours(4));
        let keys = service
            .exposed_since(UtcInstant::from_epoch_millis(0), visible_at, &[], &[])
            .await
            .unwrap();
        assert_eq!(keys.len(), 140);

        let distinct: HashSet<&[u8]> = keys.iter().map(|k| k.key_data.as_slice()).collect();
        assert_eq!(distinct.len(), 140);

        let days: HashSet<u32> = keys.iter().map(|k| k.rolling_start_number).collect();
        assert_eq!(days.len(), 14);
        for key in &keys {
            assert_eq!(key.rolling_period, 144);
            assert_eq!(key.fake, 0);
            assert_eq!(key.origin.as_deref(), Some("ES"));
        }
    }

    #[tokio::test]
    async fn padding_surfaces_only_after_its_bucket_closes() {
        let service = service(true);
        let now = now();
        service.update_fake_keys(now).await.unwrap();

        let same_bucket = service
            .exposed_since(UtcInstant::from_epoch_millis(0), now, &[], &[])
            .await
            .unwrap();
        assert!(same_bucket.is_empty());

        let next_bucket = now.plus(Duration::hours(4));
        let visible = service
            .exposed_since(UtcInstant::from_epoch_millis(0), next_bucket, &[], &[])
            .await
            .unwrap();
        assert_eq!(visible.len(), 140);
    }
}
