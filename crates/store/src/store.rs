//! The umbrella key store trait and backend selection.

use crate::error::{StoreError, StoreResult};
use crate::postgres::PostgresStore;
use crate::repos::{ExposedKeyRepo, LeaseRepo, RedeemRepo};
use crate::sqlite::SqliteStore;
use async_trait::async_trait;
use lantern_core::config::DatabaseConfig;
use std::sync::Arc;
use time::Duration;

/// Complete key store interface combining all repositories.
#[async_trait]
pub trait KeyStore: ExposedKeyRepo + RedeemRepo + LeaseRepo + Send + Sync {
    /// Run schema migrations.
    async fn migrate(&self) -> StoreResult<()>;

    /// Verify the store is reachable.
    async fn health_check(&self) -> StoreResult<()>;
}

/// Create a key store from configuration and run its migrations.
pub async fn from_config(
    config: &DatabaseConfig,
    release_bucket: Duration,
) -> StoreResult<Arc<dyn KeyStore>> {
    match config {
        DatabaseConfig::Sqlite { path } => {
            let store = SqliteStore::new(path, release_bucket).await?;
            Ok(Arc::new(store))
        }
        DatabaseConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            max_connections,
        } => {
            let store = if let Some(url) = url {
                PostgresStore::from_url(url, *max_connections, release_bucket).await?
            } else {
                let host = host
                    .as_deref()
                    .ok_or_else(|| StoreError::Config("postgres host missing".to_string()))?;
                let database = database
                    .as_deref()
                    .ok_or_else(|| StoreError::Config("postgres database missing".to_string()))?;
                PostgresStore::from_params(
                    host,
                    (*port).unwrap_or(5432),
                    username.as_deref(),
                    password.as_deref(),
                    database,
                    *max_connections,
                    release_bucket,
                )
                .await?
            };
            Ok(Arc::new(store))
        }
    }
}
