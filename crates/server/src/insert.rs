//! The key intake pipeline.
//!
//! An [`InsertManager`] runs an ordered list of filters (drop predicates
//! that may also abort the whole request) followed by an ordered list of
//! modifiers (rewrites), then hands the surviving keys to the store in one
//! transaction with `received_at` set to the bucket after `now`. Filters
//! and modifiers are tagged values, not trait objects; a pipeline is built
//! by listing them.

use crate::auth::{AuthError, Principal};
use axum::http::StatusCode;
use lantern_core::{TemporaryExposureKey, UtcInstant, ValidationUtils};
use lantern_store::{ExposedKeyRepo, KeyStore, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// Which endpoint family a claim-matching filter serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadScope {
    Exposed,
    ExposedNextDay,
}

/// Errors raised by the pipeline. `drop` failures remove single keys
/// silently; these abort the whole insert.
#[derive(Debug, Error)]
pub enum InsertError {
    #[error("bad key format: {0}")]
    BadKeyFormat(String),

    #[error("negative rolling period: {0}")]
    InvalidRollingPeriod(i32),

    #[error("claim is before onset")]
    ClaimIsBeforeOnset,

    #[error("delayed key date does not match claim")]
    DelayedKeyDateMismatch,

    #[error("fake claim with non-fake keys")]
    FakeClaimWithRealKeys,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl InsertError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadKeyFormat(_) => "bad_key_format",
            Self::InvalidRollingPeriod(_) => "invalid_rolling_period",
            Self::ClaimIsBeforeOnset => "claim_is_before_onset",
            Self::DelayedKeyDateMismatch => "invalid_date",
            Self::FakeClaimWithRealKeys => "bad_request",
            Self::Auth(_) => "auth_failure",
            Self::Store(_) => "store_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadKeyFormat(_)
            | Self::InvalidRollingPeriod(_)
            | Self::ClaimIsBeforeOnset
            | Self::DelayedKeyDateMismatch
            | Self::FakeClaimWithRealKeys => StatusCode::BAD_REQUEST,
            Self::Auth(AuthError::Signing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::FORBIDDEN,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Drop predicates, executed in declared order.
#[derive(Clone, Copy, Debug)]
pub enum KeyFilter {
    /// Hard-fail on any key whose decoded data has the wrong length.
    AssertKeyFormat,
    /// Hard-fail when the JWT's onset/fake/delayed-day claims contradict
    /// the batch.
    EnforceMatchingJwtClaims(UploadScope),
    /// Drop keys whose validity starts beyond the accepted clock skew.
    RemoveKeysFromFuture,
    /// Drop keys whose validity window lies entirely beyond retention.
    EnforceRetentionPeriod,
    /// Drop keys the client marked as fake.
    RemoveFakeKeys,
    /// Drop keys with an out-of-range rolling period; negative values
    /// hard-fail.
    EnforceValidRollingPeriod,
}

/// Rewrites, executed in declared order after the filters. A modifier that
/// cannot transform a key leaves it unchanged.
#[derive(Clone, Debug)]
pub enum KeyModifier {
    /// Stamp the federation origin and report type on keys that carry
    /// none.
    OriginStamp { origin: String, report_type: i32 },
    /// Legacy Android clients send `rollingPeriod == 0`; rewrite to 144.
    AndroidZeroRollingPeriod,
    /// Some iOS builds send short rolling periods; rewrite to 144.
    IosShortPeriod,
}

/// The configurable intake pipeline for one upload endpoint.
pub struct InsertManager {
    store: Arc<dyn KeyStore>,
    validation: Arc<ValidationUtils>,
    country: String,
    filters: Vec<KeyFilter>,
    modifiers: Vec<KeyModifier>,
}

impl InsertManager {
    pub fn new(
        store: Arc<dyn KeyStore>,
        validation: Arc<ValidationUtils>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            store,
            validation,
            country: country.into(),
            filters: Vec::new(),
            modifiers: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: KeyFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_modifier(mut self, modifier: KeyModifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Run the pipeline and insert the surviving keys. All-or-nothing: a
    /// hard filter failure inserts nothing. Returns the inserted count.
    pub async fn insert_into_database(
        &self,
        mut keys: Vec<TemporaryExposureKey>,
        user_agent: &str,
        principal: &Principal,
        now: UtcInstant,
    ) -> Result<u64, InsertError> {
        for filter in &self.filters {
            keys = self.apply_filter(filter, keys, principal, now)?;
        }
        for modifier in &self.modifiers {
            apply_modifier(modifier, &mut keys, user_agent);
        }

        if keys.is_empty() {
            return Ok(0);
        }

        // The release bucket the server chose: the last instant of the
        // bucket containing `now`, so every upload in the bucket shares a
        // tag and surfaces the moment the bucket closes.
        let received_at = now
            .next_bucket(self.validation.release_bucket())
            .minus(time::Duration::milliseconds(1));
        Ok(self
            .store
            .upsert_exposed(&keys, received_at, &self.country)
            .await?)
    }

    fn apply_filter(
        &self,
        filter: &KeyFilter,
        keys: Vec<TemporaryExposureKey>,
        principal: &Principal,
        now: UtcInstant,
    ) -> Result<Vec<TemporaryExposureKey>, InsertError> {
        match filter {
            KeyFilter::AssertKeyFormat => {
                for key in &keys {
                    if !self.validation.is_valid_key_format(key) {
                        return Err(InsertError::BadKeyFormat(format!(
                            "key data has {} bytes",
                            key.key_data.len()
                        )));
                    }
                }
                Ok(keys)
            }
            KeyFilter::EnforceMatchingJwtClaims(scope) => {
                self.enforce_claims(*scope, keys, principal)
            }
            KeyFilter::RemoveKeysFromFuture => Ok(keys
                .into_iter()
                .filter(|key| !self.validation.is_in_future(key, now))
                .collect()),
            KeyFilter::EnforceRetentionPeriod => Ok(keys
                .into_iter()
                .filter(|key| !self.validation.is_before_retention(key, now))
                .collect()),
            KeyFilter::RemoveFakeKeys => {
                Ok(keys.into_iter().filter(|key| !key.is_fake()).collect())
            }
            KeyFilter::EnforceValidRollingPeriod => {
                if let Some(key) = keys.iter().find(|key| key.rolling_period < 0) {
                    return Err(InsertError::InvalidRollingPeriod(key.rolling_period));
                }
                Ok(keys
                    .into_iter()
                    .filter(|key| self.validation.is_valid_rolling_period(key))
                    .collect())
            }
        }
    }

    fn enforce_claims(
        &self,
        scope: UploadScope,
        keys: Vec<TemporaryExposureKey>,
        principal: &Principal,
    ) -> Result<Vec<TemporaryExposureKey>, InsertError> {
        // A fake token must not smuggle real keys into the store.
        if principal.is_fake() && keys.iter().any(|key| !key.is_fake()) {
            return Err(InsertError::FakeClaimWithRealKeys);
        }

        match scope {
            UploadScope::Exposed => {
                if let Some(onset) = principal.onset()? {
                    for key in &keys {
                        if key.starts_at().date() < onset {
                            return Err(InsertError::ClaimIsBeforeOnset);
                        }
                    }
                }
            }
            UploadScope::ExposedNextDay => {
                if let Some(claimed) = principal.delayed_key_date()? {
                    for key in &keys {
                        if key.rolling_start_number != claimed {
                            return Err(InsertError::DelayedKeyDateMismatch);
                        }
                    }
                }
            }
        }
        Ok(keys)
    }
}

fn apply_modifier(modifier: &KeyModifier, keys: &mut [TemporaryExposureKey], user_agent: &str) {
    match modifier {
        KeyModifier::OriginStamp {
            origin,
            report_type,
        } => {
            for key in keys.iter_mut() {
                if key.origin.is_none() {
                    key.origin = Some(origin.clone());
                }
                if key.report_type.is_none() {
                    key.report_type = Some(*report_type);
                }
            }
        }
        KeyModifier::AndroidZeroRollingPeriod => {
            for key in keys.iter_mut() {
                if key.rolling_period == 0 {
                    tracing::info!(
                        user_agent = user_agent,
                        "Rewriting zero rolling period to 144"
                    );
                    key.rolling_period = 144;
                }
            }
        }
        KeyModifier::IosShortPeriod => {
            if user_agent.to_ascii_lowercase().contains("ios") {
                for key in keys.iter_mut() {
                    if key.rolling_period < 144 {
                        key.rolling_period = 144;
                    }
                }
            }
        }
    }
}
