use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};

use crm_auth::{PasswordPair, TokenKind};

use crate::app::routes::common::parse_user_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors, openapi};
use crate::context::PrincipalContext;
use crate::middleware::{admin_guard, auth_middleware, AuthState};

pub fn router(auth: AuthState) -> Router {
    Router::new()
        .route("/admins", get(list_managers))
        .route("/create", post(create_manager))
        .route("/activate-request/:id", post(activate_request))
        .route("/recovery-request/:id", post(recovery_request))
        .route("/ban/:id", patch(ban))
        .route("/unban/:id", patch(unban))
        .route_layer(axum::middleware::from_fn(admin_guard))
        .route_layer(axum::middleware::from_fn_with_state(auth, auth_middleware))
        // Reached through the emailed link, authenticated by the action token itself.
        .route("/activate/:token", patch(activate))
        .route("/recovery/:token", post(recover))
}

#[utoipa::path(
    get,
    path = "/api/manager/admins",
    tag = "managers",
    params(openapi::PageParams),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Managers created by the calling admin, newest first", body = openapi::UserPageDoc),
        (status = 403, description = "Caller is not an admin", body = openapi::ErrorDoc),
    )
)]
pub async fn list_managers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<dto::ManagerListQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rej) => return errors::rejection_to_response(rej),
    };

    match services
        .list_managers(principal.principal(), query.page, query.page_size)
        .await
    {
        Ok(page) => (StatusCode::OK, Json(page.map(|u| dto::user_to_json(&u)))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/manager/create",
    tag = "managers",
    request_body = openapi::CreateManagerBody,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Inactive manager created", body = openapi::UserDoc),
        (status = 400, description = "Invalid email or names", body = openapi::ErrorDoc),
        (status = 409, description = "Email already in use", body = openapi::ErrorDoc),
    )
)]
pub async fn create_manager(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::CreateManagerRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::rejection_to_response(rej),
    };

    match services
        .create_manager(principal.principal(), &body.email, &body.first_name, &body.last_name)
        .await
    {
        Ok(user) => (StatusCode::CREATED, Json(dto::user_to_json(&user))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/manager/activate-request/{id}",
    tag = "managers",
    params(("id" = String, Path, description = "Manager id")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Activation link mailed", body = openapi::ActionLinkDoc),
        (status = 404, description = "Unknown manager", body = openapi::ErrorDoc),
    )
)]
pub async fn activate_request(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    action_request(services, id, TokenKind::Activate).await
}

#[utoipa::path(
    post,
    path = "/api/manager/recovery-request/{id}",
    tag = "managers",
    params(("id" = String, Path, description = "Manager id")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Recovery link mailed", body = openapi::ActionLinkDoc),
        (status = 404, description = "Unknown manager", body = openapi::ErrorDoc),
    )
)]
pub async fn recovery_request(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    action_request(services, id, TokenKind::Recovery).await
}

async fn action_request(services: Arc<AppServices>, id: String, kind: TokenKind) -> axum::response::Response {
    let id = match parse_user_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.request_action(id, kind).await {
        Ok(url) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Check manager's email",
                "url": url,
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

#[utoipa::path(
    patch,
    path = "/api/manager/activate/{token}",
    tag = "managers",
    params(("token" = String, Path, description = "Activation token from the mailed link")),
    request_body = openapi::PasswordsBody,
    responses(
        (status = 200, description = "Account activated", body = openapi::UserDoc),
        (status = 400, description = "Passwords differ or are too weak", body = openapi::ErrorDoc),
        (status = 401, description = "Token invalid, expired or already used", body = openapi::ErrorDoc),
    )
)]
pub async fn activate(
    Extension(services): Extension<Arc<AppServices>>,
    Path(token): Path<String>,
    body: Result<Json<PasswordPair>, JsonRejection>,
) -> axum::response::Response {
    let Json(passwords) = match body {
        Ok(b) => b,
        Err(rej) => return errors::rejection_to_response(rej),
    };

    match services.activate(&token, passwords).await {
        Ok(user) => (StatusCode::OK, Json(dto::user_to_json(&user))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/manager/recovery/{token}",
    tag = "managers",
    params(("token" = String, Path, description = "Recovery token from the mailed link")),
    request_body = openapi::PasswordsBody,
    responses(
        (status = 200, description = "Password replaced and sessions revoked", body = openapi::UserDoc),
        (status = 400, description = "Passwords differ or are too weak", body = openapi::ErrorDoc),
        (status = 401, description = "Token invalid, expired or already used", body = openapi::ErrorDoc),
    )
)]
pub async fn recover(
    Extension(services): Extension<Arc<AppServices>>,
    Path(token): Path<String>,
    body: Result<Json<PasswordPair>, JsonRejection>,
) -> axum::response::Response {
    let Json(passwords) = match body {
        Ok(b) => b,
        Err(rej) => return errors::rejection_to_response(rej),
    };

    match services.recover(&token, passwords).await {
        Ok(user) => (StatusCode::OK, Json(dto::user_to_json(&user))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

#[utoipa::path(
    patch,
    path = "/api/manager/ban/{id}",
    tag = "managers",
    params(("id" = String, Path, description = "Manager id")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Manager banned and signed out everywhere"),
        (status = 403, description = "Admins cannot be banned", body = openapi::ErrorDoc),
        (status = 404, description = "Unknown manager", body = openapi::ErrorDoc),
    )
)]
pub async fn ban(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_user_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ban(id).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "Manager banned": "true" }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

#[utoipa::path(
    patch,
    path = "/api/manager/unban/{id}",
    tag = "managers",
    params(("id" = String, Path, description = "Manager id")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Manager unbanned"),
        (status = 404, description = "Unknown manager", body = openapi::ErrorDoc),
    )
)]
pub async fn unban(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_user_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.unban(id).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "Manager unbanned": "true" }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
