use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crm_core::UserId;

use crate::Role;

/// What a token may be used for.
///
/// Each kind is signed with its own secret, and the kind is also carried in
/// the claims so a token can never be replayed for a different purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
    Activate,
    Recovery,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::Activate => "activate",
            TokenKind::Recovery => "recovery",
        }
    }

    /// Single-purpose tokens delivered by email.
    pub fn is_action(&self) -> bool {
        matches!(self, TokenKind::Activate | TokenKind::Recovery)
    }
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims model (transport-agnostic).
///
/// Timestamps are unix seconds, as required by the JWT registered claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: the staff account the token was issued to.
    pub sub: UserId,

    /// Role at issue time.
    pub role: Role,

    pub kind: TokenKind,

    /// Unique token id; two tokens issued in the same second still differ.
    pub jti: Uuid,

    /// Issued-at (unix seconds).
    pub iat: i64,

    /// Expiration (unix seconds).
    pub exp: i64,
}

impl JwtClaims {
    pub fn new(
        sub: UserId,
        role: Role,
        kind: TokenKind,
        issued_at: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            sub,
            role,
            kind,
            jti: Uuid::now_v7(),
            iat: issued_at.timestamp(),
            exp: expiry(issued_at, ttl).timestamp(),
        }
    }
}

/// `issued_at + ttl`, saturating at the latest representable instant.
pub fn expiry(issued_at: DateTime<Utc>, ttl: chrono::Duration) -> DateTime<Utc> {
    issued_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("wrong token kind: expected {expected}, got {actual}")]
    WrongKind { expected: TokenKind, actual: TokenKind },
}

/// Deterministically validate JWT claims.
///
/// Signature verification happens before this in [`crate::jwt`].
pub fn validate_claims(
    claims: &JwtClaims,
    expected: TokenKind,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if claims.kind != expected {
        return Err(TokenValidationError::WrongKind {
            expected,
            actual: claims.kind,
        });
    }
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
