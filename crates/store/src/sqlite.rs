//! SQLite-based key store implementation, used by tests and small
//! deployments.

use crate::error::StoreResult;
use crate::models::ExposedKeyRow;
use crate::postgres::schema_statements;
use crate::repos::{ExposedKeyRepo, LeaseRepo, RedeemRepo};
use crate::store::KeyStore;
use async_trait::async_trait;
use lantern_core::{TEN_MINUTES_MS, TemporaryExposureKey, UtcInstant};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::path::Path;
use time::Duration;

/// SQLite schema (embedded).
const SQLITE_SCHEMA: &str = include_str!("sqlite_schema.sql");

/// SQLite-based key store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    release_bucket: Duration,
}

impl SqliteStore {
    /// Create a new SQLite store, creating the database file if missing.
    pub async fn new(path: &Path, release_bucket: Duration) -> StoreResult<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        // Writes serialize through a single connection; SQLite locks the
        // whole database anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            release_bucket,
        };
        store.migrate().await?;

        Ok(store)
    }
}

#[async_trait]
impl KeyStore for SqliteStore {
    async fn migrate(&self) -> StoreResult<()> {
        for statement in schema_statements(SQLITE_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ExposedKeyRepo for SqliteStore {
    async fn upsert_exposed(
        &self,
        keys: &[TemporaryExposureKey],
        received_at: UtcInstant,
        country: &str,
    ) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for key in keys {
            let row = ExposedKeyRow::from_key(key, received_at, country);
            let result = sqlx::query(
                r#"
                INSERT INTO t_exposed (
                    key_data, rolling_start_number, rolling_period,
                    transmission_risk_level, received_at, country,
                    origin, report_type, days_since_onset_of_symptoms
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT (key_data, rolling_start_number) DO NOTHING
                "#,
            )
            .bind(&row.key_data)
            .bind(row.rolling_start_number)
            .bind(row.rolling_period)
            .bind(row.transmission_risk_level)
            .bind(row.received_at)
            .bind(&row.country)
            .bind(&row.origin)
            .bind(row.report_type)
            .bind(row.days_since_onset_of_symptoms)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn get_sorted_exposed_since(
        &self,
        since: UtcInstant,
        now: UtcInstant,
        visited_countries: &[String],
        origin_countries: &[String],
    ) -> StoreResult<Vec<TemporaryExposureKey>> {
        let until = now.bucket_start(self.release_bucket);

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT key_data, rolling_start_number, rolling_period, \
             transmission_risk_level, received_at, country, origin, \
             report_type, days_since_onset_of_symptoms \
             FROM t_exposed WHERE received_at >= ",
        );
        qb.push_bind(since.timestamp_millis());
        qb.push(" AND received_at < ");
        qb.push_bind(until.timestamp_millis());
        // Next-day release: never publish a key whose validity window is
        // still open at the bucket boundary.
        qb.push(" AND (rolling_start_number + rolling_period) * 600000 < ");
        qb.push_bind(until.timestamp_millis());

        if !visited_countries.is_empty() {
            qb.push(" AND country IN (");
            let mut sep = qb.separated(", ");
            for country in visited_countries {
                sep.push_bind(country);
            }
            qb.push(")");
        }
        if !origin_countries.is_empty() {
            qb.push(" AND origin IN (");
            let mut sep = qb.separated(", ");
            for origin in origin_countries {
                sep.push_bind(origin);
            }
            qb.push(")");
        }
        qb.push(" ORDER BY key_data ASC");

        let rows = qb
            .build_query_as::<ExposedKeyRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ExposedKeyRow::into_key).collect())
    }

    async fn clean_exposed(&self, retention: Duration, now: UtcInstant) -> StoreResult<u64> {
        let cutoff = now.minus(retention).timestamp_millis();
        let result = sqlx::query("DELETE FROM t_exposed WHERE rolling_start_number * ?1 < ?2")
            .bind(TEN_MINUTES_MS)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RedeemRepo for SqliteStore {
    async fn insert_nonce(&self, nonce: &str, expiry: UtcInstant) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO t_redeem (uuid, expiry) VALUES (?1, ?2) ON CONFLICT (uuid) DO NOTHING",
        )
        .bind(nonce)
        .bind(expiry.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn clean_redeemed(&self, now: UtcInstant) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM t_redeem WHERE expiry < ?1")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LeaseRepo for SqliteStore {
    async fn acquire_lease(
        &self,
        name: &str,
        holder: &str,
        max_hold: Duration,
        now: UtcInstant,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO t_shedlock (name, lock_until, locked_at, locked_by)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (name) DO UPDATE
            SET lock_until = excluded.lock_until,
                locked_at = excluded.locked_at,
                locked_by = excluded.locked_by
            WHERE t_shedlock.lock_until <= excluded.locked_at
            "#,
        )
        .bind(name)
        .bind(now.plus(max_hold).timestamp_millis())
        .bind(now.timestamp_millis())
        .bind(holder)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_lease(
        &self,
        name: &str,
        holder: &str,
        min_hold: Duration,
        now: UtcInstant,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE t_shedlock SET lock_until = MAX(locked_at + ?1, ?2) \
             WHERE name = ?3 AND locked_by = ?4",
        )
        .bind(min_hold.whole_milliseconds() as i64)
        .bind(now.timestamp_millis())
        .bind(name)
        .bind(holder)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
