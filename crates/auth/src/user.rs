//! Staff account model (admins and managers).
//!
//! Managers are created by an admin without a password, become usable once
//! they set one through an activation link, and can be banned/unbanned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crm_core::{DomainError, DomainResult, UserId, validate};

use crate::Role;

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// Staff account.
///
/// # Invariants
/// - `email` is normalized (trimmed, lowercased).
/// - An account without a password hash cannot sign in.
/// - Admin accounts cannot be banned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub is_banned: bool,
    /// Managers created by this account (admins only).
    pub managers: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A fresh, inactive manager account.
    pub fn new_manager(input: NewManager, now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(),
            email: input.email,
            password_hash: None,
            first_name: input.first_name,
            last_name: input.last_name,
            role: Role::Manager,
            is_active: false,
            is_banned: false,
            managers: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// An active admin account with a password already set (bootstrap).
    pub fn new_admin(
        email: &str,
        first_name: &str,
        last_name: &str,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id: UserId::new(),
            email: validate::normalize_email(email)?,
            password_hash: Some(password_hash),
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            role: Role::Admin,
            is_active: true,
            is_banned: false,
            managers: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Account-state gate for sign-in and token refresh.
    pub fn ensure_can_sign_in(&self) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::forbidden("Account is not active"));
        }
        if self.is_banned {
            return Err(DomainError::forbidden("Account is banned"));
        }
        Ok(())
    }

    /// Set the first password and mark the account active.
    pub fn activate(&mut self, password_hash: String, now: DateTime<Utc>) {
        self.password_hash = Some(password_hash);
        self.is_active = true;
        self.updated_at = now;
    }

    pub fn set_password(&mut self, password_hash: String, now: DateTime<Utc>) {
        self.password_hash = Some(password_hash);
        self.updated_at = now;
    }

    pub fn ban(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.role == Role::Admin {
            return Err(DomainError::forbidden("admin accounts cannot be banned"));
        }
        self.is_banned = true;
        self.updated_at = now;
        Ok(())
    }

    pub fn unban(&mut self, now: DateTime<Utc>) {
        self.is_banned = false;
        self.updated_at = now;
    }

    /// Record a manager created by this admin.
    pub fn add_managed(&mut self, manager: UserId, now: DateTime<Utc>) {
        if !self.managers.contains(&manager) {
            self.managers.push(manager);
            self.updated_at = now;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inputs
// ─────────────────────────────────────────────────────────────────────────────

/// Validated input for creating a manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewManager {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl NewManager {
    pub fn parse(email: &str, first_name: &str, last_name: &str) -> DomainResult<Self> {
        Ok(Self {
            email: validate::normalize_email(email)?,
            first_name: validate::person_name("firstName", first_name)?,
            last_name: validate::person_name("lastName", last_name)?,
        })
    }
}

/// Password + confirmation submitted on activation and recovery.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordPair {
    pub first_password: String,
    pub second_password: String,
}

impl PasswordPair {
    /// Validate strength and confirmation; returns the accepted password.
    pub fn into_password(self) -> DomainResult<String> {
        validate::password(&self.first_password)?;
        if self.first_password != self.second_password {
            return Err(DomainError::validation("Passwords do not match"));
        }
        Ok(self.first_password)
    }
}
