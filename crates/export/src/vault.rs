//! Named keypair registry.
//!
//! The server resolves EC keypairs by role: `gaen` signs export bundles,
//! `nextDayJWT` signs the delayed-key upload tokens, `hashFilter` backs
//! response hashing.

use crate::error::{ExportError, ExportResult};
use crate::signer::EcKeyPair;
use lantern_core::config::{KeyVaultConfig, PrivateKeyConfig};
use std::collections::HashMap;
use std::sync::Arc;

/// Export signing key name.
pub const GAEN: &str = "gaen";
/// Delayed-key JWT signing key name.
pub const NEXT_DAY_JWT: &str = "nextDayJWT";
/// Response hashing key name.
pub const HASH_FILTER: &str = "hashFilter";

/// Registry of named EC keypairs.
pub struct KeyVault {
    keys: HashMap<&'static str, Arc<EcKeyPair>>,
}

impl KeyVault {
    /// Load all named keypairs from configuration.
    pub fn from_config(config: &KeyVaultConfig) -> ExportResult<Self> {
        let mut keys = HashMap::new();
        keys.insert(GAEN, Arc::new(load_keypair(GAEN, &config.gaen)?));
        keys.insert(
            NEXT_DAY_JWT,
            Arc::new(load_keypair(NEXT_DAY_JWT, &config.next_day_jwt)?),
        );
        keys.insert(
            HASH_FILTER,
            Arc::new(load_keypair(HASH_FILTER, &config.hash_filter)?),
        );
        Ok(Self { keys })
    }

    /// A vault of freshly generated keys, for tests.
    pub fn generate() -> Self {
        let mut keys = HashMap::new();
        for name in [GAEN, NEXT_DAY_JWT, HASH_FILTER] {
            keys.insert(name, Arc::new(EcKeyPair::generate()));
        }
        Self { keys }
    }

    /// Resolve a keypair by name.
    pub fn get(&self, name: &str) -> Option<Arc<EcKeyPair>> {
        self.keys.get(name).cloned()
    }
}

/// Load a single keypair from its configured source.
fn load_keypair(name: &str, config: &PrivateKeyConfig) -> ExportResult<EcKeyPair> {
    match config {
        PrivateKeyConfig::File { path } => {
            let pem = std::fs::read_to_string(path).map_err(|e| {
                ExportError::KeyParsing(format!(
                    "failed to read key file {}: {e}",
                    path.display()
                ))
            })?;
            let keypair = EcKeyPair::from_pem(&pem)?;
            tracing::info!(key = name, path = %path.display(), "Loaded signing key");
            Ok(keypair)
        }
        PrivateKeyConfig::Env { var } => {
            let pem = std::env::var(var)
                .map_err(|_| ExportError::KeyParsing(format!("key env var not set: {var}")))?;
            let keypair = EcKeyPair::from_pem(&pem)?;
            tracing::info!(key = name, var = var, "Loaded signing key from env");
            Ok(keypair)
        }
        PrivateKeyConfig::Value { pem } => {
            tracing::warn!(key = name, "Using inline signing key (not recommended for production)");
            EcKeyPair::from_pem(pem)
        }
        PrivateKeyConfig::Generate => {
            tracing::warn!(
                key = name,
                "Generating ephemeral signing key; it will not survive a restart"
            );
            Ok(EcKeyPair::generate())
        }
    }
}
