//! Application state shared across handlers.

use crate::auth::{JwtValidator, RequestValidator};
use crate::fake_keys::FakeKeyService;
use crate::insert::{InsertManager, KeyFilter, KeyModifier, UploadScope};
use lantern_core::config::{AppConfig, AuthConfig, PublicKeyConfig};
use lantern_core::time::Clock;
use lantern_core::validation::ValidationUtils;
use lantern_export::{EcKeyPair, ExportBundler, KeyVault, vault};
use lantern_store::KeyStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Key store.
    pub store: Arc<dyn KeyStore>,
    /// Synthetic-key padding service.
    pub fake_keys: Arc<FakeKeyService>,
    /// Export bundle assembler.
    pub bundler: Arc<ExportBundler>,
    /// Upload request validator.
    pub validator: Arc<RequestValidator>,
    /// Intake pipeline for the exposed endpoints.
    pub insert_exposed: Arc<InsertManager>,
    /// Intake pipeline for the V1 next-day endpoint.
    pub insert_next_day: Arc<InsertManager>,
    /// Shared validation utilities.
    pub validation: Arc<ValidationUtils>,
    /// Keypair signing next-day upload tokens.
    pub next_day_jwt_key: Arc<EcKeyPair>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create the application state.
    ///
    /// # Panics
    ///
    /// Panics if configuration validation fails or the auth verification
    /// key cannot be loaded; both are startup-time configuration errors.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn KeyStore>,
        vault: &KeyVault,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if let Err(error) = config.validate() {
            panic!("Invalid configuration: {error}");
        }

        let gaen_key = vault
            .get(vault::GAEN)
            .expect("vault always carries the gaen key");
        let next_day_jwt_key = vault
            .get(vault::NEXT_DAY_JWT)
            .expect("vault always carries the nextDayJWT key");

        let validation = Arc::new(ValidationUtils::new(
            config.gaen.key_size_bytes,
            config.gaen.retention(),
            config.gaen.release_bucket(),
            config.gaen.time_skew(),
        ));

        let bundler = Arc::new(ExportBundler::new(
            gaen_key,
            &config.signing,
            config.gaen.region.clone(),
        ));

        let validator = Arc::new(build_validator(&config, &next_day_jwt_key, store.clone()));

        let insert_exposed = Arc::new(build_pipeline(
            UploadScope::Exposed,
            &config,
            store.clone(),
            validation.clone(),
        ));
        let insert_next_day = Arc::new(build_pipeline(
            UploadScope::ExposedNextDay,
            &config,
            store.clone(),
            validation.clone(),
        ));

        let fake_keys = Arc::new(FakeKeyService::new(&config));

        Self {
            config: Arc::new(config),
            store,
            fake_keys,
            bundler,
            validator,
            insert_exposed,
            insert_next_day,
            validation,
            next_day_jwt_key,
            clock,
        }
    }
}

/// The intake pipeline an endpoint family runs, in mandated order.
fn build_pipeline(
    scope: UploadScope,
    config: &AppConfig,
    store: Arc<dyn KeyStore>,
    validation: Arc<ValidationUtils>,
) -> InsertManager {
    let mut manager = InsertManager::new(store, validation, config.gaen.country.clone())
        .with_filter(KeyFilter::AssertKeyFormat)
        .with_filter(KeyFilter::EnforceMatchingJwtClaims(scope))
        .with_filter(KeyFilter::RemoveKeysFromFuture)
        .with_filter(KeyFilter::EnforceRetentionPeriod)
        .with_filter(KeyFilter::RemoveFakeKeys)
        .with_filter(KeyFilter::EnforceValidRollingPeriod)
        .with_modifier(KeyModifier::OriginStamp {
            origin: config.federation.country_origin.clone(),
            report_type: config.federation.report_type,
        });

    if config.gaen.android_zero_rolling_period_fix {
        manager = manager.with_modifier(KeyModifier::AndroidZeroRollingPeriod);
    }
    if config.gaen.ios_short_period_fix {
        manager = manager.with_modifier(KeyModifier::IosShortPeriod);
    }
    manager
}

fn build_validator(
    config: &AppConfig,
    next_day_jwt_key: &EcKeyPair,
    store: Arc<dyn KeyStore>,
) -> RequestValidator {
    match &config.auth {
        AuthConfig::Passthrough => {
            tracing::warn!("Upload authentication is pass-through; uploads are NOT verified");
            RequestValidator::PassThrough
        }
        AuthConfig::Jwt { public_key } => {
            let pem = match public_key {
                Some(source) => resolve_public_key(source),
                // Single-server deployments verify against the key that
                // also signs next-day tokens.
                None => next_day_jwt_key
                    .public_key_pem()
                    .unwrap_or_else(|e| panic!("Failed to derive auth public key: {e}")),
            };
            let validator = JwtValidator::new(&pem, store)
                .unwrap_or_else(|e| panic!("Failed to build JWT validator: {e}"));
            RequestValidator::Jwt(validator)
        }
    }
}

fn resolve_public_key(source: &PublicKeyConfig) -> String {
    match source {
        PublicKeyConfig::File { path } => std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read auth public key {}: {e}", path.display())),
        PublicKeyConfig::Env { var } => std::env::var(var)
            .unwrap_or_else(|_| panic!("Auth public key env var not set: {var}")),
        PublicKeyConfig::Value { pem } => pem.clone(),
    }
}
