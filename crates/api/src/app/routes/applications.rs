use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};

use crm_applications::{ApplicationPatch, ApplicationQueryParams, NewComment};

use crate::app::routes::common::parse_application_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors, openapi};
use crate::context::PrincipalContext;
use crate::middleware::{admin_guard, auth_middleware, AuthState};

pub fn router(auth: AuthState) -> Router {
    Router::new()
        .route("/stats", get(statistics))
        .route_layer(axum::middleware::from_fn(admin_guard))
        .route("/", get(list_applications))
        .route("/my-applications", get(my_applications))
        .route("/:id", get(get_application))
        .route("/update/:id", patch(update_application))
        .route("/addcomm/:id", patch(add_comment))
        .route_layer(axum::middleware::from_fn_with_state(auth, auth_middleware))
}

#[utoipa::path(
    get,
    path = "/api/applications",
    tag = "applications",
    params(openapi::ApplicationListParams),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "One page of matching applications", body = openapi::ApplicationPageDoc),
        (status = 400, description = "Bad filter, sort or page", body = openapi::ErrorDoc),
    )
)]
pub async fn list_applications(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<ApplicationQueryParams>, QueryRejection>,
) -> axum::response::Response {
    let Query(params) = match query {
        Ok(q) => q,
        Err(rej) => return errors::rejection_to_response(rej),
    };
    list(services, params, None).await
}

#[utoipa::path(
    get,
    path = "/api/applications/my-applications",
    tag = "applications",
    params(openapi::ApplicationListParams),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Matching applications assigned to the caller", body = openapi::ApplicationPageDoc),
        (status = 400, description = "Bad filter, sort or page", body = openapi::ErrorDoc),
    )
)]
pub async fn my_applications(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<ApplicationQueryParams>, QueryRejection>,
) -> axum::response::Response {
    let Query(params) = match query {
        Ok(q) => q,
        Err(rej) => return errors::rejection_to_response(rej),
    };
    list(services, params, Some(principal.user_id())).await
}

async fn list(
    services: Arc<AppServices>,
    params: ApplicationQueryParams,
    only_managed_by: Option<crm_core::UserId>,
) -> axum::response::Response {
    match services.list_applications(params, only_managed_by).await {
        Ok(page) => {
            let page = page.map(|view| dto::application_to_json(&view));
            (StatusCode::OK, Json(page)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/applications/stats",
    tag = "applications",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Application counts by status", body = openapi::StatisticsDoc),
        (status = 403, description = "Caller is not an admin", body = openapi::ErrorDoc),
    )
)]
pub async fn statistics(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.statistics().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/applications/{id}",
    tag = "applications",
    params(("id" = String, Path, description = "Application id")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The application with manager and comments", body = openapi::ApplicationDoc),
        (status = 404, description = "Unknown application", body = openapi::ErrorDoc),
    )
)]
pub async fn get_application(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_application_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.get_application(id).await {
        Ok(view) => (StatusCode::OK, Json(dto::application_to_json(&view))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

#[utoipa::path(
    patch,
    path = "/api/applications/update/{id}",
    tag = "applications",
    params(("id" = String, Path, description = "Application id")),
    request_body = openapi::ApplicationPatchBody,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Updated application", body = openapi::ApplicationDoc),
        (status = 400, description = "Invalid field value", body = openapi::ErrorDoc),
        (status = 403, description = "Assigned to another manager", body = openapi::ErrorDoc),
        (status = 404, description = "Unknown application", body = openapi::ErrorDoc),
    )
)]
pub async fn update_application(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<ApplicationPatch>, JsonRejection>,
) -> axum::response::Response {
    let id = match parse_application_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(patch) = match body {
        Ok(b) => b,
        Err(rej) => return errors::rejection_to_response(rej),
    };

    match services.update_application(id, patch, principal.principal()).await {
        Ok(view) => (StatusCode::OK, Json(dto::application_to_json(&view))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

#[utoipa::path(
    patch,
    path = "/api/applications/addcomm/{id}",
    tag = "applications",
    params(("id" = String, Path, description = "Application id")),
    request_body = openapi::CommentBody,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Comment added; the lead is assigned to the caller", body = openapi::ApplicationDoc),
        (status = 400, description = "Empty or overlong comment", body = openapi::ErrorDoc),
        (status = 403, description = "Assigned to another manager", body = openapi::ErrorDoc),
        (status = 404, description = "Unknown application", body = openapi::ErrorDoc),
    )
)]
pub async fn add_comment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<NewComment>, JsonRejection>,
) -> axum::response::Response {
    let id = match parse_application_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::rejection_to_response(rej),
    };

    match services.add_comment(id, body, principal.principal()).await {
        Ok(view) => (StatusCode::OK, Json(dto::application_to_json(&view))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
