//! Redeem-nonce repository.

use crate::error::StoreResult;
use async_trait::async_trait;
use lantern_core::UtcInstant;

/// Repository bounding replay of upload tokens.
#[async_trait]
pub trait RedeemRepo: Send + Sync {
    /// Record a nonce with its expiry. Returns true when the nonce was
    /// previously unseen.
    async fn insert_nonce(&self, nonce: &str, expiry: UtcInstant) -> StoreResult<bool>;

    /// Remove nonces that expired before `now`. Returns the deleted count.
    async fn clean_redeemed(&self, now: UtcInstant) -> StoreResult<u64>;
}
