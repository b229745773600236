use crm_auth::{Principal, Role};
use crm_core::UserId;

/// Principal context for a request (authenticated identity + role).
///
/// Inserted by the auth middleware; present on every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
    access_token: String,
}

impl PrincipalContext {
    pub fn new(principal: Principal, access_token: String) -> Self {
        Self {
            principal,
            access_token,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn role(&self) -> Role {
        self.principal.role
    }

    /// The bearer token this request was authenticated with.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}
