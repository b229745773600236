//! API-side role guard.
//!
//! Roles come from the stored account (resolved by the auth middleware), never
//! from client input.

use crm_auth::{AuthzError, Role, require_role};

use crate::context::PrincipalContext;

/// Check that the current caller holds `role` (admins hold every role).
pub fn require(principal: &PrincipalContext, role: Role) -> Result<(), AuthzError> {
    require_role(principal.principal(), role)
}
