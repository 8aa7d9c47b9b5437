//! Persistent stores for the lantern exposure-notification backend.
//!
//! Three concerns behind one [`KeyStore`] trait:
//! - the exposed-key set indexed by rolling start and release bucket
//! - single-use redeem nonces bounding upload-token replay
//! - scheduler leases so replicated deployments run each job once
//!
//! PostgreSQL and SQLite backends share the trait; a separate in-memory
//! exposed-key store backs the fake-key service.

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod sqlite;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryExposedStore;
pub use postgres::PostgresStore;
pub use repos::{ExposedKeyRepo, LeaseRepo, RedeemRepo};
pub use sqlite::SqliteStore;
pub use store::{KeyStore, from_config};
