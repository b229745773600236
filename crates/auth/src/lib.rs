//! `crm-auth`: authentication/authorization boundary.
//!
//! Token signing, password hashing, role checks and the staff account model.
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{AuthzError, require_role};
pub use claims::{JwtClaims, TokenKind, TokenValidationError, expiry, validate_claims};
pub use jwt::{Hs256TokenService, JwtValidator, TokenError, TokenPair, TokenSecrets, TokenTtls};
pub use password::{PasswordError, PasswordHasher};
pub use principal::Principal;
pub use roles::Role;
pub use user::{NewManager, PasswordPair, User};
