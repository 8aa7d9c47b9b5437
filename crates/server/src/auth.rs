//! Upload authentication: JWT claim extraction and scope checks.
//!
//! Uploads carry a short-lived bearer JWT (ES256) whose claims drive the
//! insert pipeline: `scope` selects the endpoint family, `onset` bounds how
//! old uploaded keys may be, `fake` marks dummy uploads and `jti` is
//! consumed through the redeem store so a token authorizes exactly one
//! upload. A pass-through variant exists for tests.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use lantern_core::UtcInstant;
use lantern_export::EcKeyPair;
use lantern_store::{KeyStore, RedeemRepo};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use time::Duration;
use time::macros::format_description;

/// Scope claim for the exposed endpoints.
pub const SCOPE_EXPOSED: &str = "exposed";
/// Scope claim for the V1 next-day endpoint.
pub const SCOPE_EXPOSED_NEXT_DAY: &str = "exposed-next-day";

/// How long an issued next-day token stays valid.
const NEXT_DAY_TOKEN_LIFETIME: Duration = Duration::days(2);

/// Authentication and authorization errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("wrong scope: {0}")]
    WrongScope(String),

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Claims carried by upload JWTs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadClaims {
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub scope: String,
    /// Symptom onset date, `YYYY-MM-DD`. Keys older than this day are
    /// rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onset: Option<String>,
    /// "0"/"1" dummy-upload marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fake: Option<String>,
    /// 10-minute interval of the day the next-day key belongs to.
    #[serde(rename = "delayedKeyDate", default, skip_serializing_if = "Option::is_none")]
    pub delayed_key_date: Option<String>,
}

/// The authenticated party behind an upload.
#[derive(Clone, Debug)]
pub enum Principal {
    /// Verified JWT claims.
    Jwt(UploadClaims),
    /// Pass-through validation (tests only).
    Trusted,
}

impl Principal {
    /// Whether the token marks a dummy upload.
    pub fn is_fake(&self) -> bool {
        match self {
            Self::Jwt(claims) => claims.fake.as_deref() == Some("1"),
            Self::Trusted => false,
        }
    }

    /// The onset date, compared on day granularity.
    pub fn onset(&self) -> Result<Option<time::Date>, AuthError> {
        let Self::Jwt(claims) = self else {
            return Ok(None);
        };
        let Some(onset) = claims.onset.as_deref() else {
            return Ok(None);
        };
        let format = format_description!("[year]-[month]-[day]");
        time::Date::parse(onset, format)
            .map(Some)
            .map_err(|_| AuthError::AuthFailure(format!("invalid onset date: {onset}")))
    }

    /// The delayed-key interval from a next-day token.
    pub fn delayed_key_date(&self) -> Result<Option<u32>, AuthError> {
        let Self::Jwt(claims) = self else {
            return Ok(None);
        };
        let Some(raw) = claims.delayed_key_date.as_deref() else {
            return Ok(None);
        };
        raw.parse::<u32>().map(Some).map_err(|_| {
            AuthError::AuthFailure(format!("invalid delayedKeyDate claim: {raw}"))
        })
    }
}

/// Request validation adapter. The production variant parses and verifies
/// JWTs; the pass-through variant trusts every request and exists for
/// tests.
pub enum RequestValidator {
    Jwt(JwtValidator),
    PassThrough,
}

impl RequestValidator {
    /// Authenticate a request and check its scope.
    pub async fn validate(
        &self,
        headers: &HeaderMap,
        expected_scope: &str,
    ) -> Result<Principal, AuthError> {
        match self {
            Self::Jwt(validator) => validator.validate(headers, expected_scope).await,
            Self::PassThrough => Ok(Principal::Trusted),
        }
    }
}

/// JWT-verifying request validator.
pub struct JwtValidator {
    decoding_key: DecodingKey,
    store: Arc<dyn KeyStore>,
}

impl JwtValidator {
    /// Create a validator from a PEM-encoded EC public key. The store
    /// bounds token replay via the `jti` claim.
    pub fn new(public_key_pem: &str, store: Arc<dyn KeyStore>) -> Result<Self, AuthError> {
        let decoding_key = DecodingKey::from_ec_pem(public_key_pem.as_bytes())
            .map_err(|e| AuthError::Signing(format!("invalid verification key: {e}")))?;
        Ok(Self {
            decoding_key,
            store,
        })
    }

    async fn validate(
        &self,
        headers: &HeaderMap,
        expected_scope: &str,
    ) -> Result<Principal, AuthError> {
        let token = extract_bearer_token(headers)
            .ok_or_else(|| AuthError::AuthFailure("missing bearer token".to_string()))?;

        let mut validation = Validation::new(Algorithm::ES256);
        validation.validate_exp = true;

        let data = decode::<UploadClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| AuthError::AuthFailure(format!("invalid token: {e}")))?;
        let claims = data.claims;

        if claims.scope != expected_scope {
            return Err(AuthError::WrongScope(claims.scope));
        }

        // Each token authorizes exactly one upload.
        let jti = claims
            .jti
            .as_deref()
            .ok_or_else(|| AuthError::AuthFailure("missing jti claim".to_string()))?;
        let expiry = UtcInstant::from_epoch_millis(claims.exp.saturating_mul(1_000));
        let fresh = self
            .store
            .insert_nonce(jti, expiry)
            .await
            .map_err(|e| AuthError::AuthFailure(format!("redeem store unavailable: {e}")))?;
        if !fresh {
            return Err(AuthError::AuthFailure("token already redeemed".to_string()));
        }

        Ok(Principal::Jwt(claims))
    }
}

/// Extract bearer token from the Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(&v[7..])
            } else {
                None
            }
        })
}

/// Sign the JWT a V1 upload gets back, authorizing the client to upload
/// the named day's key tomorrow. Token validity rides the wall clock;
/// verification compares `exp` against it.
pub fn issue_next_day_jwt(
    keypair: &EcKeyPair,
    delayed_key_date: u32,
    fake: bool,
) -> Result<String, AuthError> {
    let issued_at = UtcInstant::now();
    let claims = UploadClaims {
        iat: issued_at.timestamp_millis() / 1_000,
        exp: issued_at.plus(NEXT_DAY_TOKEN_LIFETIME).timestamp_millis() / 1_000,
        jti: Some(uuid::Uuid::new_v4().to_string()),
        scope: SCOPE_EXPOSED_NEXT_DAY.to_string(),
        onset: None,
        fake: Some(if fake { "1" } else { "0" }.to_string()),
        delayed_key_date: Some(delayed_key_date.to_string()),
    };

    let pem = keypair
        .private_key_pem()
        .map_err(|e| AuthError::Signing(e.to_string()))?;
    let encoding_key = EncodingKey::from_ec_pem(pem.as_bytes())
        .map_err(|e| AuthError::Signing(format!("invalid signing key: {e}")))?;
    encode(&Header::new(Algorithm::ES256), &claims, &encoding_key)
        .map_err(|e| AuthError::Signing(format!("failed to encode token: {e}")))
}

/// Sign an upload token directly; used by tests standing in for the
/// separate authorization service.
pub fn issue_upload_jwt(
    keypair: &EcKeyPair,
    claims: &UploadClaims,
) -> Result<String, AuthError> {
    let pem = keypair
        .private_key_pem()
        .map_err(|e| AuthError::Signing(e.to_string()))?;
    let encoding_key = EncodingKey::from_ec_pem(pem.as_bytes())
        .map_err(|e| AuthError::Signing(format!("invalid signing key: {e}")))?;
    encode(&Header::new(Algorithm::ES256), claims, &encoding_key)
        .map_err(|e| AuthError::Signing(format!("failed to encode token: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_store::SqliteStore;
    use time::Duration as TimeDuration;

    fn claims(scope: &str, jti: Option<&str>) -> UploadClaims {
        let now = UtcInstant::now();
        UploadClaims {
            iat: now.timestamp_millis() / 1_000,
            exp: now.plus(TimeDuration::hours(1)).timestamp_millis() / 1_000,
            jti: jti.map(str::to_string),
            scope: scope.to_string(),
            onset: Some("2020-06-20".to_string()),
            fake: Some("0".to_string()),
            delayed_key_date: None,
        }
    }

    async fn validator(keypair: &EcKeyPair) -> (tempfile::TempDir, JwtValidator) {
        let temp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(&temp.path().join("auth.db"), TimeDuration::hours(2))
            .await
            .unwrap();
        let validator =
            JwtValidator::new(&keypair.public_key_pem().unwrap(), Arc::new(store)).unwrap();
        (temp, validator)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn accepts_valid_token_once() {
        let keypair = EcKeyPair::generate();
        let (_temp, validator) = validator(&keypair).await;
        let token = issue_upload_jwt(&keypair, &claims(SCOPE_EXPOSED, Some("jti-1"))).unwrap();

        let principal = validator.validate(&bearer(&token), SCOPE_EXPOSED).await.unwrap();
        assert!(!principal.is_fake());
        assert_eq!(
            principal.onset().unwrap(),
            Some(time::Date::from_calendar_date(2020, time::Month::June, 20).unwrap())
        );

        // Replay of the same jti is refused.
        let replay = validator.validate(&bearer(&token), SCOPE_EXPOSED).await;
        assert!(matches!(replay, Err(AuthError::AuthFailure(_))));
    }

    #[tokio::test]
    async fn rejects_wrong_scope() {
        let keypair = EcKeyPair::generate();
        let (_temp, validator) = validator(&keypair).await;
        let token = issue_upload_jwt(&keypair, &claims(SCOPE_EXPOSED, Some("jti-2"))).unwrap();

        let result = validator
            .validate(&bearer(&token), SCOPE_EXPOSED_NEXT_DAY)
            .await;
        assert!(matches!(result, Err(AuthError::WrongScope(_))));
    }

    #[tokio::test]
    async fn rejects_wrong_key_and_garbage() {
        let keypair = EcKeyPair::generate();
        let other = EcKeyPair::generate();
        let (_temp, validator) = validator(&keypair).await;

        let forged = issue_upload_jwt(&other, &claims(SCOPE_EXPOSED, Some("jti-3"))).unwrap();
        assert!(validator.validate(&bearer(&forged), SCOPE_EXPOSED).await.is_err());
        assert!(validator.validate(&bearer("garbage"), SCOPE_EXPOSED).await.is_err());
        assert!(
            validator
                .validate(&HeaderMap::new(), SCOPE_EXPOSED)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn rejects_expired_token() {
        let keypair = EcKeyPair::generate();
        let (_temp, validator) = validator(&keypair).await;

        let mut expired = claims(SCOPE_EXPOSED, Some("jti-4"));
        expired.exp = expired.iat - 3_600;
        let token = issue_upload_jwt(&keypair, &expired).unwrap();
        assert!(validator.validate(&bearer(&token), SCOPE_EXPOSED).await.is_err());
    }

    #[tokio::test]
    async fn rejects_missing_jti() {
        let keypair = EcKeyPair::generate();
        let (_temp, validator) = validator(&keypair).await;
        let token = issue_upload_jwt(&keypair, &claims(SCOPE_EXPOSED, None)).unwrap();
        assert!(validator.validate(&bearer(&token), SCOPE_EXPOSED).await.is_err());
    }

    #[tokio::test]
    async fn next_day_token_roundtrips() {
        let keypair = EcKeyPair::generate();
        let (_temp, validator) = validator(&keypair).await;

        let token = issue_next_day_jwt(&keypair, 2_655_072, false).unwrap();
        let principal = validator
            .validate(&bearer(&token), SCOPE_EXPOSED_NEXT_DAY)
            .await
            .unwrap();
        assert_eq!(principal.delayed_key_date().unwrap(), Some(2_655_072));
        assert!(!principal.is_fake());
    }

    #[test]
    fn trusted_principal_has_no_claims() {
        let principal = Principal::Trusted;
        assert!(!principal.is_fake());
        assert_eq!(principal.onset().unwrap(), None);
        assert_eq!(principal.delayed_key_date().unwrap(), None);
    }
}
