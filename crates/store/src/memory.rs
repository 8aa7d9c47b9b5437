//! In-memory exposed-key store.
//!
//! Backs the fake-key service: synthetic keys live in their own ephemeral
//! store so retention sweeps never touch them and real uploads cannot
//! collide with them. Also handy in unit tests.

use crate::error::StoreResult;
use crate::models::ExposedKeyRow;
use crate::repos::ExposedKeyRepo;
use async_trait::async_trait;
use lantern_core::{TemporaryExposureKey, UtcInstant};
use std::collections::BTreeMap;
use time::Duration;
use tokio::sync::RwLock;

type KeyId = (Vec<u8>, i64);

/// Ephemeral in-memory implementation of [`ExposedKeyRepo`].
pub struct MemoryExposedStore {
    rows: RwLock<BTreeMap<KeyId, ExposedKeyRow>>,
    release_bucket: Duration,
}

impl MemoryExposedStore {
    pub fn new(release_bucket: Duration) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            release_bucket,
        }
    }

    /// Drop every stored key.
    pub async fn clear(&self) {
        self.rows.write().await.clear();
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl ExposedKeyRepo for MemoryExposedStore {
    async fn upsert_exposed(
        &self,
        keys: &[TemporaryExposureKey],
        received_at: UtcInstant,
        country: &str,
    ) -> StoreResult<u64> {
        let mut rows = self.rows.write().await;
        let mut inserted = 0u64;
        for key in keys {
            let row = ExposedKeyRow::from_key(key, received_at, country);
            let id = (row.key_data.clone(), row.rolling_start_number);
            if let std::collections::btree_map::Entry::Vacant(entry) = rows.entry(id) {
                entry.insert(row);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn get_sorted_exposed_since(
        &self,
        since: UtcInstant,
        now: UtcInstant,
        visited_countries: &[String],
        origin_countries: &[String],
    ) -> StoreResult<Vec<TemporaryExposureKey>> {
        let until = now.bucket_start(self.release_bucket).timestamp_millis();
        let since = since.timestamp_millis();

        let rows = self.rows.read().await;
        // The map is keyed by (key_data, rolling_start), so iteration is
        // already in export order.
        let keys = rows
            .values()
            .filter(|row| row.received_at >= since && row.received_at < until)
            .filter(|row| (row.rolling_start_number + row.rolling_period) * 600_000 < until)
            .filter(|row| {
                visited_countries.is_empty() || visited_countries.contains(&row.country)
            })
            .filter(|row| origin_countries.is_empty() || origin_countries.contains(&row.origin))
            .cloned()
            .map(ExposedKeyRow::into_key)
            .collect();
        Ok(keys)
    }

    async fn clean_exposed(&self, retention: Duration, now: UtcInstant) -> StoreResult<u64> {
        let cutoff = now.minus(retention);
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, row| {
            UtcInstant::from_ten_minute_interval(row.rolling_start_number as u32) >= cutoff
        });
        Ok((before - rows.len()) as u64)
    }
}
