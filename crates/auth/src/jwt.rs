//! HS256 token issuance and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crm_core::UserId;

use crate::{JwtClaims, Role, TokenKind, TokenValidationError, expiry, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed or badly signed token")]
    Invalid,

    #[error(transparent)]
    Claims(#[from] TokenValidationError),

    #[error("failed to sign token: {0}")]
    Encode(String),
}

/// Verifies a bearer token of a given kind.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, kind: TokenKind, now: DateTime<Utc>) -> Result<JwtClaims, TokenError>;
}

/// One signing secret per token kind.
#[derive(Clone)]
pub struct TokenSecrets {
    pub access: Vec<u8>,
    pub refresh: Vec<u8>,
    pub activate: Vec<u8>,
    pub recovery: Vec<u8>,
}

impl core::fmt::Debug for TokenSecrets {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("TokenSecrets(<redacted>)")
    }
}

/// Lifetime per token kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTtls {
    pub access: Duration,
    pub refresh: Duration,
    pub activate: Duration,
    pub recovery: Duration,
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self {
            access: Duration::minutes(15),
            refresh: Duration::days(30),
            activate: Duration::days(1),
            recovery: Duration::hours(1),
        }
    }
}

/// Access/refresh pair handed out on sign-in and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KindKeys {
    fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }
}

/// Issues and verifies every token kind with HS256.
#[derive(Clone)]
pub struct Hs256TokenService {
    access: KindKeys,
    refresh: KindKeys,
    activate: KindKeys,
    recovery: KindKeys,
    validation: Validation,
}

impl Hs256TokenService {
    pub fn new(secrets: &TokenSecrets, ttls: TokenTtls) -> Self {
        // Time checks run in `validate_claims` against an explicit `now`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            access: KindKeys::new(&secrets.access, ttls.access),
            refresh: KindKeys::new(&secrets.refresh, ttls.refresh),
            activate: KindKeys::new(&secrets.activate, ttls.activate),
            recovery: KindKeys::new(&secrets.recovery, ttls.recovery),
            validation,
        }
    }

    fn keys(&self, kind: TokenKind) -> &KindKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
            TokenKind::Activate => &self.activate,
            TokenKind::Recovery => &self.recovery,
        }
    }

    /// When a token of `kind` issued at `issued_at` stops verifying.
    pub fn expires_at(&self, kind: TokenKind, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        expiry(issued_at, self.keys(kind).ttl)
    }

    pub fn issue(
        &self,
        sub: UserId,
        role: Role,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let keys = self.keys(kind);
        let claims = JwtClaims::new(sub, role, kind, now, keys.ttl);
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    pub fn issue_pair(&self, sub: UserId, role: Role, now: DateTime<Utc>) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue(sub, role, TokenKind::Access, now)?,
            refresh_token: self.issue(sub, role, TokenKind::Refresh, now)?,
        })
    }
}

impl JwtValidator for Hs256TokenService {
    fn validate(&self, token: &str, kind: TokenKind, now: DateTime<Utc>) -> Result<JwtClaims, TokenError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.keys(kind).decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(kind = %kind, error = %e, "token decode failed");
                TokenError::Invalid
            })?;
        validate_claims(&data.claims, kind, now)?;
        Ok(data.claims)
    }
}
