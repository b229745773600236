//! Field validators shared by the account and application models.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DomainError, DomainResult};

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][a-z]{1,9}$").expect("name regex"));

static PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^380\d{9}$").expect("phone regex"));

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 16;

/// Trim and lowercase an email, rejecting malformed addresses.
pub fn normalize_email(raw: &str) -> DomainResult<String> {
    let email = raw.trim().to_lowercase();
    if !EMAIL.is_match(&email) {
        return Err(DomainError::validation("email must be a valid address"));
    }
    Ok(email)
}

/// Person name: capitalised, 2-10 latin letters.
pub fn person_name(field: &str, raw: &str) -> DomainResult<String> {
    let name = raw.trim();
    if !NAME.is_match(name) {
        return Err(DomainError::validation(format!(
            "{field} must start with a capital letter followed by 1-9 lowercase letters"
        )));
    }
    Ok(name.to_string())
}

/// Ukrainian mobile number in `380XXXXXXXXX` form.
pub fn phone(raw: &str) -> DomainResult<String> {
    let phone = raw.trim();
    if !PHONE.is_match(phone) {
        return Err(DomainError::validation("phone must be in format 380XXXXXXXXX"));
    }
    Ok(phone.to_string())
}

/// Password strength rule.
///
/// 8-16 non-whitespace characters with at least one ASCII digit, one ASCII
/// upper-case letter, one ASCII lower-case letter and one symbol. A symbol is
/// anything but an ASCII letter or digit, `_`, `:` or whitespace, so non-ASCII
/// letters count as symbols.
pub fn password(raw: &str) -> DomainResult<()> {
    let len = raw.chars().count();
    let ok = (PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len)
        && !raw.chars().any(char::is_whitespace)
        && raw.chars().any(|c| c.is_ascii_digit())
        && raw.chars().any(|c| c.is_ascii_uppercase())
        && raw.chars().any(|c| c.is_ascii_lowercase())
        && raw.chars().any(is_symbol);
    if !ok {
        return Err(DomainError::validation(
            "password must be 8-16 characters with a digit, an upper-case letter, a lower-case letter and a symbol",
        ));
    }
    Ok(())
}

fn is_symbol(c: char) -> bool {
    !(c.is_ascii_alphanumeric() || c == '_' || c == ':' || c.is_whitespace())
}
