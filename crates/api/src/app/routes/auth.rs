use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::{dto, errors, openapi};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::middleware::{auth_middleware, AuthState};

pub fn router(auth: AuthState) -> Router {
    Router::new()
        .route("/me", get(me))
        .route("/sign-out", post(sign_out))
        .route_layer(axum::middleware::from_fn_with_state(auth, auth_middleware))
        .route("/sign-in", post(sign_in))
        .route("/refresh", post(refresh))
}

#[utoipa::path(
    post,
    path = "/api/auth/sign-in",
    tag = "auth",
    request_body = openapi::SignInBody,
    responses(
        (status = 200, description = "Signed in", body = openapi::SignInDoc),
        (status = 400, description = "Malformed body", body = openapi::ErrorDoc),
        (status = 401, description = "Wrong email or password", body = openapi::ErrorDoc),
        (status = 403, description = "Account is not active or is banned", body = openapi::ErrorDoc),
    )
)]
pub async fn sign_in(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::SignInRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::rejection_to_response(rej),
    };

    match services.sign_in(&body.email, &body.password).await {
        Ok(signed_in) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "user": dto::user_to_json(&signed_in.user),
                "tokens": dto::tokens_to_json(&signed_in.tokens),
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    request_body = openapi::RefreshBody,
    responses(
        (status = 200, description = "New access/refresh pair; the presented one is revoked", body = openapi::TokensDoc),
        (status = 401, description = "Refresh token invalid, expired or already used", body = openapi::ErrorDoc),
    )
)]
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RefreshRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::rejection_to_response(rej),
    };

    match services.refresh(&body.refresh_token).await {
        Ok(tokens) => (StatusCode::OK, Json(dto::tokens_to_json(&tokens))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The calling account", body = openapi::UserDoc),
        (status = 401, description = "Missing or inactive token", body = openapi::ErrorDoc),
    )
)]
pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.me(principal.principal()).await {
        Ok(user) => (StatusCode::OK, Json(dto::user_to_json(&user))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/sign-out",
    tag = "auth",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Missing or inactive token", body = openapi::ErrorDoc),
    )
)]
pub async fn sign_out(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.sign_out(&principal).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
