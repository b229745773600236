//! Process configuration loaded from environment variables.

use chrono::Duration;
use thiserror::Error;

use crm_auth::{TokenSecrets, TokenTtls};
use crm_auth::password::DEFAULT_ITERATIONS;

const DEV_SECRET_PREFIX: &str = "crm-dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Credentials of the admin account created at startup when absent.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

impl core::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Base URL used when building activation and recovery links.
    pub frontend_url: String,
    pub secrets: TokenSecrets,
    pub ttls: TokenTtls,
    pub password_hash_iterations: u32,
    pub database_url: Option<String>,
    pub admin: Option<AdminBootstrap>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let secret = |name: &'static str, purpose: &str| -> Vec<u8> {
            match var(name) {
                Some(s) => s.into_bytes(),
                None => {
                    tracing::warn!(variable = name, "secret not set; using an insecure development default");
                    format!("{DEV_SECRET_PREFIX}-{purpose}").into_bytes()
                }
            }
        };

        let defaults = TokenTtls::default();
        let ttl = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match var(name) {
                None => Ok(default),
                Some(raw) => match raw
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .and_then(Duration::try_seconds)
                {
                    Some(ttl) => Ok(ttl),
                    None => Err(ConfigError::Invalid {
                        name,
                        expected: "a positive number of seconds",
                        value: raw,
                    }),
                },
            }
        };

        let password_hash_iterations = match var("PASSWORD_HASH_ITERATIONS") {
            None => DEFAULT_ITERATIONS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "PASSWORD_HASH_ITERATIONS",
                        expected: "a positive integer",
                        value: raw,
                    });
                }
            },
        };

        let admin = match (var("ADMIN_EMAIL"), var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminBootstrap { email, password }),
            (None, None) => None,
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!("ADMIN_EMAIL and ADMIN_PASSWORD must be set together; skipping admin bootstrap");
                None
            }
        };

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            frontend_url: var("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            secrets: TokenSecrets {
                access: secret("JWT_ACCESS_SECRET", "access"),
                refresh: secret("JWT_REFRESH_SECRET", "refresh"),
                activate: secret("JWT_ACTIVATE_SECRET", "activate"),
                recovery: secret("JWT_RECOVERY_SECRET", "recovery"),
            },
            ttls: TokenTtls {
                access: ttl("ACCESS_TOKEN_TTL_SECS", defaults.access)?,
                refresh: ttl("REFRESH_TOKEN_TTL_SECS", defaults.refresh)?,
                activate: ttl("ACTIVATE_TOKEN_TTL_SECS", defaults.activate)?,
                recovery: ttl("RECOVERY_TOKEN_TTL_SECS", defaults.recovery)?,
            },
            password_hash_iterations,
            database_url: var("DATABASE_URL"),
            admin,
        })
    }
}
