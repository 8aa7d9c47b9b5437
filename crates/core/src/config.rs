//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Key store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    /// SQLite database (testing and small deployments only).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL (takes precedence over individual fields).
        url: Option<String>,
        /// Database host.
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer the LANTERN_DATABASE__PASSWORD env var over
        /// storing it in config.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/lantern.db"),
        }
    }
}

impl DatabaseConfig {
    /// Validate database configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            DatabaseConfig::Sqlite { .. } => Ok(()),
            DatabaseConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => {
                    Err("postgres config requires either 'url' or 'host' + 'database'".to_string())
                }
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// GAEN protocol configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GaenConfig {
    /// Release bucket width in milliseconds (default: 2 hours).
    #[serde(default = "default_release_bucket_ms")]
    pub release_bucket_ms: u64,
    /// Minimum wall time an upload request takes, in milliseconds, to
    /// flatten observable timing (default: 1500).
    #[serde(default = "default_request_time_ms")]
    pub request_time_ms: u64,
    /// Cache lifetime advertised on key downloads, in milliseconds.
    #[serde(default = "default_exposed_list_cache_control_ms")]
    pub exposed_list_cache_control_ms: u64,
    /// Days a key stays downloadable (default: 14).
    #[serde(default = "default_retention_days")]
    pub retention_days: u16,
    /// Exact size of a decoded key in bytes (default: 16).
    #[serde(default = "default_key_size_bytes")]
    pub key_size_bytes: usize,
    /// Accepted client clock skew in seconds (default: 2 hours).
    #[serde(default = "default_time_skew_secs")]
    pub time_skew_secs: u64,
    /// Region string embedded in the protobuf export header.
    #[serde(default = "default_region")]
    pub region: String,
    /// Upload country stamped on stored keys and matched by the
    /// `visitedCountries` download filter.
    #[serde(default = "default_country")]
    pub country: String,
    /// Rewrite the legacy Android `rollingPeriod == 0` to 144.
    #[serde(default)]
    pub android_zero_rolling_period_fix: bool,
    /// Rewrite short rolling periods from iOS clients to 144.
    #[serde(default)]
    pub ios_short_period_fix: bool,
}

fn default_release_bucket_ms() -> u64 {
    7_200_000
}

fn default_request_time_ms() -> u64 {
    1_500
}

fn default_exposed_list_cache_control_ms() -> u64 {
    300_000
}

fn default_retention_days() -> u16 {
    14
}

fn default_key_size_bytes() -> usize {
    16
}

fn default_time_skew_secs() -> u64 {
    7_200
}

fn default_region() -> String {
    "es".to_string()
}

fn default_country() -> String {
    "ES".to_string()
}

impl Default for GaenConfig {
    fn default() -> Self {
        Self {
            release_bucket_ms: default_release_bucket_ms(),
            request_time_ms: default_request_time_ms(),
            exposed_list_cache_control_ms: default_exposed_list_cache_control_ms(),
            retention_days: default_retention_days(),
            key_size_bytes: default_key_size_bytes(),
            time_skew_secs: default_time_skew_secs(),
            region: default_region(),
            country: default_country(),
            android_zero_rolling_period_fix: false,
            ios_short_period_fix: false,
        }
    }
}

impl GaenConfig {
    pub fn release_bucket(&self) -> Duration {
        Duration::milliseconds(self.release_bucket_ms.min(i64::MAX as u64) as i64)
    }

    pub fn request_time(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_time_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::days(i64::from(self.retention_days))
    }

    pub fn time_skew(&self) -> Duration {
        Duration::seconds(self.time_skew_secs.min(i64::MAX as u64) as i64)
    }

    pub fn exposed_list_cache_control(&self) -> Duration {
        Duration::milliseconds(self.exposed_list_cache_control_ms.min(i64::MAX as u64) as i64)
    }

    /// Validate GAEN configuration for settings that would break the
    /// release protocol at runtime.
    pub fn validate(&self) -> Result<(), String> {
        if self.release_bucket_ms == 0 {
            return Err("gaen.release_bucket_ms cannot be 0".to_string());
        }
        if Duration::days(1).whole_milliseconds() as u64 % self.release_bucket_ms != 0 {
            return Err(format!(
                "gaen.release_bucket_ms {} must divide one day evenly",
                self.release_bucket_ms
            ));
        }
        if self.retention_days == 0 {
            return Err("gaen.retention_days cannot be 0".to_string());
        }
        if self.key_size_bytes == 0 {
            return Err("gaen.key_size_bytes cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Fake-key padding configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FakeKeyConfig {
    /// Enable synthetic-key padding (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Synthetic keys generated per retained day (default: 10).
    #[serde(default = "default_fake_key_amount")]
    pub amount: u32,
}

fn default_fake_key_amount() -> u32 {
    10
}

impl Default for FakeKeyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: default_fake_key_amount(),
        }
    }
}

/// Federation (EFGS) stamping configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Origin country stamped on keys without one (ISO-3166 alpha-2).
    #[serde(default = "default_country")]
    pub country_origin: String,
    /// Report type stamped on keys without one (1..4).
    #[serde(default = "default_report_type")]
    pub report_type: i32,
}

fn default_report_type() -> i32 {
    1
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            country_origin: default_country(),
            report_type: default_report_type(),
        }
    }
}

/// Source of a PEM-encoded EC private key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PrivateKeyConfig {
    /// Key stored in a file.
    File {
        /// Path to the PEM file.
        path: PathBuf,
    },
    /// Key stored in an environment variable.
    Env {
        /// Environment variable name.
        var: String,
    },
    /// Key provided directly as a value (NOT recommended for production).
    Value {
        /// PEM-encoded key.
        pem: String,
    },
    /// Generate a new key at startup (development only).
    Generate,
}

impl Default for PrivateKeyConfig {
    fn default() -> Self {
        Self::Generate
    }
}

/// Named EC keypairs the server resolves by role.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KeyVaultConfig {
    /// Export signing key ("gaen").
    #[serde(default)]
    pub gaen: PrivateKeyConfig,
    /// Next-day upload JWT signing key ("nextDayJWT").
    #[serde(default)]
    pub next_day_jwt: PrivateKeyConfig,
    /// Response hashing key ("hashFilter").
    #[serde(default)]
    pub hash_filter: PrivateKeyConfig,
}

/// Export signing configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SigningConfig {
    /// GAEN signature algorithm OID (default: ECDSA-P256-SHA256).
    #[serde(default = "default_algorithm_oid")]
    pub algorithm_oid: String,
    /// `verificationKeyVersion` advertised in the signing info.
    #[serde(default = "default_key_version")]
    pub key_version: String,
    /// `verificationKeyId` advertised in the signing info.
    #[serde(default = "default_key_identifier")]
    pub key_identifier: String,
    /// iOS bundle identifier the export is published for.
    #[serde(default)]
    pub bundle_id: String,
    /// Android package name the export is published for.
    #[serde(default)]
    pub package_name: String,
    /// Keypair sources.
    #[serde(default)]
    pub keys: KeyVaultConfig,
}

fn default_algorithm_oid() -> String {
    "1.2.840.10045.4.3.2".to_string()
}

fn default_key_version() -> String {
    "v1".to_string()
}

fn default_key_identifier() -> String {
    "214".to_string()
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm_oid: default_algorithm_oid(),
            key_version: default_key_version(),
            key_identifier: default_key_identifier(),
            bundle_id: String::new(),
            package_name: String::new(),
            keys: KeyVaultConfig::default(),
        }
    }
}

/// Upload authentication configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AuthConfig {
    /// Verify bearer JWTs against an EC public key.
    Jwt {
        /// PEM source of the verification public key. When absent the
        /// nextDayJWT vault public key is used, which only makes sense for
        /// single-server deployments where the same service signs and
        /// verifies.
        public_key: Option<PublicKeyConfig>,
    },
    /// Accept every upload without authentication (tests only).
    Passthrough,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::Jwt { public_key: None }
    }
}

/// Source of a PEM-encoded EC public key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PublicKeyConfig {
    File { path: PathBuf },
    Env { var: String },
    Value { pem: String },
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Key store configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// GAEN protocol configuration.
    #[serde(default)]
    pub gaen: GaenConfig,
    /// Fake-key padding configuration.
    #[serde(default)]
    pub fake_keys: FakeKeyConfig,
    /// Federation stamping configuration.
    #[serde(default)]
    pub federation: FederationConfig,
    /// Export signing configuration.
    #[serde(default)]
    pub signing: SigningConfig,
    /// Upload authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses SQLite, pass-through auth, generated
    /// keys and no upload time-leveling.
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.auth = AuthConfig::Passthrough;
        config.gaen.request_time_ms = 0;
        config
    }

    /// Validate the whole configuration, failing fast on errors.
    pub fn validate(&self) -> Result<(), String> {
        self.database.validate()?;
        self.gaen.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaen_defaults_match_protocol() {
        let config = GaenConfig::default();
        assert_eq!(config.release_bucket(), Duration::hours(2));
        assert_eq!(config.retention(), Duration::days(14));
        assert_eq!(config.key_size_bytes, 16);
        assert_eq!(config.time_skew(), Duration::hours(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn release_bucket_must_divide_a_day() {
        let mut config = GaenConfig::default();
        config.release_bucket_ms = 7_000_000;
        assert!(config.validate().is_err());

        config.release_bucket_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn postgres_config_requires_url_or_host_and_database() {
        let invalid = DatabaseConfig::Postgres {
            url: None,
            host: None,
            port: Some(5432),
            username: None,
            password: None,
            database: None,
            max_connections: 10,
        };
        assert!(invalid.validate().is_err());

        let valid = DatabaseConfig::Postgres {
            url: Some("postgres://localhost/lantern".to_string()),
            host: None,
            port: Some(5432),
            username: None,
            password: None,
            database: None,
            max_connections: 10,
        };
        assert!(valid.validate().is_ok());
    }

    #[test]
    fn deserialize_minimal_config() {
        let json = r#"{"gaen": {"retention_days": 7}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.gaen.retention_days, 7);
        assert_eq!(config.gaen.release_bucket_ms, 7_200_000);
        assert!(matches!(config.auth, AuthConfig::Jwt { .. }));
    }

    #[test]
    fn testing_config_disables_leveling_and_auth() {
        let config = AppConfig::for_testing();
        assert!(matches!(config.auth, AuthConfig::Passthrough));
        assert_eq!(config.gaen.request_time_ms, 0);
        assert!(config.validate().is_ok());
    }
}
