//! Scheduler lease repository.

use crate::error::StoreResult;
use async_trait::async_trait;
use lantern_core::UtcInstant;
use time::Duration;

/// Database-backed lease so at most one replica runs a scheduled job per
/// tick. A lease is free when its `lock_until` is in the past; acquiring
/// extends it by `max_hold`, releasing pulls it back to
/// `max(now, locked_at + min_hold)`.
#[async_trait]
pub trait LeaseRepo: Send + Sync {
    /// Try to take the named lease. Returns false when another holder
    /// still owns it.
    async fn acquire_lease(
        &self,
        name: &str,
        holder: &str,
        max_hold: Duration,
        now: UtcInstant,
    ) -> StoreResult<bool>;

    /// Release the named lease if `holder` owns it.
    async fn release_lease(
        &self,
        name: &str,
        holder: &str,
        min_hold: Duration,
        now: UtcInstant,
    ) -> StoreResult<()>;
}
