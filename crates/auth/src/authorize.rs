use thiserror::Error;

use crate::{Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{0}' required")]
    MissingRole(Role),
}

/// Check that a principal holds `required`.
///
/// Admins satisfy every role requirement.
pub fn require_role(principal: &Principal, required: Role) -> Result<(), AuthzError> {
    if principal.role == required || principal.is_admin() {
        Ok(())
    } else {
        Err(AuthzError::MissingRole(required))
    }
}
