//! PostgreSQL-based key store implementation.

use crate::error::StoreResult;
use crate::models::ExposedKeyRow;
use crate::repos::{ExposedKeyRepo, LeaseRepo, RedeemRepo};
use crate::store::KeyStore;
use async_trait::async_trait;
use lantern_core::{TEN_MINUTES_MS, TemporaryExposureKey, UtcInstant};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres, QueryBuilder};
use std::str::FromStr;
use time::Duration;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

pub(crate) fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based key store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
    release_bucket: Duration,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        release_bucket: Duration,
    ) -> StoreResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, release_bucket).await
    }

    /// Create a new PostgreSQL store from individual connection parameters,
    /// so credentials can arrive separately (e.g. passwords via env vars).
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        max_connections: u32,
        release_bucket: Duration,
    ) -> StoreResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }
        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            "Connecting to PostgreSQL"
        );

        Self::connect(opts, max_connections, release_bucket).await
    }

    async fn connect(
        opts: PgConnectOptions,
        max_connections: u32,
        release_bucket: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            release_bucket,
        };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl KeyStore for PostgresStore {
    async fn migrate(&self) -> StoreResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared
        // statement, so the schema is split and executed piecewise.
        for statement in schema_statements(POSTGRES_SCHEMA) {
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
impl ExposedKeyRepo for PostgresStore {
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
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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

        let mut qb = QueryBuilder::<Postgres>::new(
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
        let result =
            sqlx::query("DELETE FROM t_exposed WHERE rolling_start_number * $1 < $2")
                .bind(TEN_MINUTES_MS)
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RedeemRepo for PostgresStore {
    async fn insert_nonce(&self, nonce: &str, expiry: UtcInstant) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO t_redeem (uuid, expiry) VALUES ($1, $2) ON CONFLICT (uuid) DO NOTHING",
        )
        .bind(nonce)
        .bind(expiry.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn clean_redeemed(&self, now: UtcInstant) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM t_redeem WHERE expiry < $1")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LeaseRepo for PostgresStore {
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
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE
            SET lock_until = EXCLUDED.lock_until,
                locked_at = EXCLUDED.locked_at,
                locked_by = EXCLUDED.locked_by
            WHERE t_shedlock.lock_until <= EXCLUDED.locked_at
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
            "UPDATE t_shedlock SET lock_until = GREATEST(locked_at + $1, $2) \
             WHERE name = $3 AND locked_by = $4",
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_splits_into_statements() {
        let statements = schema_statements(POSTGRES_SCHEMA);
        assert!(statements.iter().any(|s| s.contains("t_exposed")));
        assert!(statements.iter().any(|s| s.contains("t_redeem")));
        assert!(statements.iter().any(|s| s.contains("t_shedlock")));
        assert!(statements.iter().all(|s| !s.trim().is_empty()));
    }
}
