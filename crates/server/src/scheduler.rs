//! Periodic maintenance under a distributed lease.
//!
//! Two jobs, each guarded by a store lease so at most one replica runs per
//! tick; missed ticks are not made up:
//! - `cleanData`: hourly, one-minute initial delay; prunes expired keys
//!   and redeem nonces.
//! - `updateFakeKeys`: daily at 02:00 UTC; regenerates the padding set.

use crate::state::AppState;
use lantern_core::time::next_occurrence;
use lantern_store::{ExposedKeyRepo, LeaseRepo, RedeemRepo};
use time::{Duration, Time};
use tokio::task::JoinHandle;

/// Lease name of the cleanup job.
pub const CLEAN_DATA_LEASE: &str = "cleanData";
/// Lease name of the fake-key refresh job.
pub const UPDATE_FAKE_KEYS_LEASE: &str = "updateFakeKeys";

/// Upper bound on how long a crashed replica can wedge a lease.
const LEASE_MAX_HOLD: Duration = Duration::minutes(30);

const CLEAN_INITIAL_DELAY: std::time::Duration = std::time::Duration::from_secs(60);
const CLEAN_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// Spawn both scheduled jobs. The returned handles live for the process.
pub fn spawn(state: AppState) -> Vec<JoinHandle<()>> {
    // One holder identity per process; the lease table records who runs.
    let holder = uuid::Uuid::new_v4().to_string();

    let clean_state = state.clone();
    let clean_holder = holder.clone();
    let clean = tokio::spawn(async move {
        tokio::time::sleep(CLEAN_INITIAL_DELAY).await;
        let mut ticker = tokio::time::interval(CLEAN_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_clean_data(&clean_state, &clean_holder).await;
        }
    });

    let fake_state = state;
    let fake = tokio::spawn(async move {
        let two_am = Time::from_hms(2, 0, 0).expect("02:00:00 is a valid time");
        loop {
            let now = fake_state.clock.now();
            let next = next_occurrence(now, two_am);
            let wait = (next.timestamp_millis() - now.timestamp_millis()).max(0) as u64;
            tokio::time::sleep(std::time::Duration::from_millis(wait)).await;
            run_update_fake_keys(&fake_state, &holder).await;
        }
    });

    vec![clean, fake]
}

/// One cleanup tick: prune expired keys and redeem nonces if the lease is
/// free.
pub async fn run_clean_data(state: &AppState, holder: &str) {
    let now = state.clock.now();
    match state
        .store
        .acquire_lease(CLEAN_DATA_LEASE, holder, LEASE_MAX_HOLD, now)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!("cleanData lease held by another replica, skipping");
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to acquire cleanData lease");
            return;
        }
    }

    tracing::info!("Start DB cleanup");
    match state
        .store
        .clean_exposed(state.config.gaen.retention(), now)
        .await
    {
        Ok(deleted) => tracing::info!(deleted, "Pruned expired keys"),
        Err(e) => tracing::error!(error = %e, "Failed to prune expired keys"),
    }
    match state.store.clean_redeemed(now).await {
        Ok(deleted) => tracing::info!(deleted, "Pruned expired redeem nonces"),
        Err(e) => tracing::error!(error = %e, "Failed to prune redeem nonces"),
    }

    release(state, CLEAN_DATA_LEASE, holder).await;
    tracing::info!("DB cleanup done");
}

/// One refresh tick: regenerate the fake-key padding if the lease is free.
pub async fn run_update_fake_keys(state: &AppState, holder: &str) {
    let now = state.clock.now();
    match state
        .store
        .acquire_lease(UPDATE_FAKE_KEYS_LEASE, holder, LEASE_MAX_HOLD, now)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!("updateFakeKeys lease held by another replica, skipping");
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to acquire updateFakeKeys lease");
            return;
        }
    }

    tracing::info!("Start fake key update");
    if let Err(e) = state.fake_keys.update_fake_keys(now).await {
        tracing::error!(error = %e, "Failed to update fake keys");
    }
    release(state, UPDATE_FAKE_KEYS_LEASE, holder).await;
    tracing::info!("End fake key update");
}

async fn release(state: &AppState, lease: &str, holder: &str) {
    if let Err(e) = state
        .store
        .release_lease(lease, holder, Duration::ZERO, state.clock.now())
        .await
    {
        tracing::error!(error = %e, lease, "Failed to release lease");
    }
}
