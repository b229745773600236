//! Salted PBKDF2-SHA256 password hashing.
//!
//! Encoded form: `pbkdf2-sha256$<iterations>$<salt b64>$<hash b64>`.

use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

const SCHEME: &str = "pbkdf2-sha256";
pub const DEFAULT_ITERATIONS: u32 = 600_000;
const SALT_LENGTH: usize = 16;
const HASH_LENGTH: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("stored password hash is malformed")]
    Malformed,
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn hash(&self, password: &str) -> String {
        let mut salt = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);

        let mut out = [0u8; HASH_LENGTH];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, self.iterations, &mut out);

        format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(out)
        )
    }

    /// Check `password` against an encoded hash.
    ///
    /// The iteration count stored in the hash wins over this hasher's setting,
    /// so hashes survive a change of `PASSWORD_HASH_ITERATIONS`.
    pub fn verify(&self, password: &str, encoded: &str) -> Result<bool, PasswordError> {
        let mut parts = encoded.split('$');
        let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(PasswordError::Malformed);
        };

        let iterations: u32 = iterations.parse().map_err(|_| PasswordError::Malformed)?;
        let salt = STANDARD_NO_PAD.decode(salt).map_err(|_| PasswordError::Malformed)?;
        let expected = STANDARD_NO_PAD.decode(expected).map_err(|_| PasswordError::Malformed)?;
        if iterations == 0 || expected.len() != HASH_LENGTH {
            return Err(PasswordError::Malformed);
        }

        let mut actual = [0u8; HASH_LENGTH];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut actual);
        Ok(bool::from(actual.as_slice().ct_eq(expected.as_slice())))
    }
}
