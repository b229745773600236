use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crm_auth::Role;

use crate::app::errors::{self, service_error_to_response};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub services: Arc<AppServices>,
}

/// Require a live access token and attach the caller's `PrincipalContext`.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    // Owned so no borrow of the request is held across the await below.
    let token = extract_bearer(req.headers())
        .map_err(|msg| errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", msg))?
        .to_string();

    let principal = state
        .services
        .authenticate(&token)
        .await
        .map_err(service_error_to_response)?;

    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// Reject callers that are not admins. Must run inside `auth_middleware`.
pub async fn admin_guard(
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let Some(principal) = req.extensions().get::<PrincipalContext>() else {
        return Err(errors::json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing credentials",
        ));
    };

    if let Err(e) = crate::authz::require(principal, Role::Admin) {
        tracing::info!(user_id = %principal.user_id(), "admin route refused");
        return Err(errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()));
    }

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, &'static str> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("missing Authorization header")?;

    let header = header.to_str().map_err(|_| "malformed Authorization header")?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or("expected a Bearer token")?;

    let token = header.trim();
    if token.is_empty() {
        return Err("expected a Bearer token");
    }

    Ok(token)
}
