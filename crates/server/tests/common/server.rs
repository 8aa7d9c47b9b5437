//! Server test harness.

use lantern_core::config::AppConfig;
use lantern_core::{Clock, FixedClock, UtcInstant};
use lantern_export::KeyVault;
use lantern_server::{AppState, create_router};
use lantern_store::{KeyStore, SqliteStore};
use std::sync::Arc;
use tempfile::TempDir;
use time::Duration;

/// A test server with a scratch SQLite store and a pinned clock.
/// Note: #[allow(dead_code)] because each test file compiles common/
/// separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub clock: Arc<FixedClock>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Pass-through auth, no fake keys, clock at 01:00 on the base day.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let mut config = AppConfig::for_testing();
        modifier(&mut config);

        let store: Arc<dyn KeyStore> = Arc::new(
            SqliteStore::new(
                &temp_dir.path().join("keys.db"),
                config.gaen.release_bucket(),
            )
            .await
            .expect("Failed to create key store"),
        );

        let clock = Arc::new(FixedClock::at(
            UtcInstant::from_epoch_millis(super::BASE_MS).plus(Duration::hours(1)),
        ));
        let vault = KeyVault::generate();

        let state = AppState::new(config, store, &vault, clock.clone());
        let router = create_router(state.clone());

        Self {
            router,
            state,
            clock,
            _temp_dir: temp_dir,
        }
    }

    /// Current pinned time.
    pub fn now(&self) -> UtcInstant {
        self.clock.now()
    }

    /// Move the pinned clock forward.
    pub fn advance(&self, d: Duration) {
        self.clock.advance(d);
    }
}
