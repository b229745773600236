use axum::response::Response;

use crm_core::{ApplicationId, UserId};

use crate::app::errors;

/// Parse a path id, answering 400 `invalid_id` on failure.
pub fn parse_user_id(raw: &str) -> Result<UserId, Response> {
    raw.parse()
        .map_err(|e: crm_core::DomainError| errors::service_error_to_response(e.into()))
}

pub fn parse_application_id(raw: &str) -> Result<ApplicationId, Response> {
    raw.parse()
        .map_err(|e: crm_core::DomainError| errors::service_error_to_response(e.into()))
}
