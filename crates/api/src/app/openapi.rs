//! OpenAPI document for the HTTP API, served through Swagger UI.
//!
//! Handlers build their JSON by hand, so the shapes below describe the wire format
//! only and are never constructed.

use axum::Router;
use serde::Serialize;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{IntoParams, Modify, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::app::routes;

pub const DOCS_PATH: &str = "/api/docs";
pub const SPEC_PATH: &str = "/api/docs/openapi.json";

/// Name of the bearer security scheme referenced by protected operations.
pub const BEARER: &str = "bearer";

#[derive(OpenApi)]
#[openapi(
    info(title = "School CRM API", description = "Leads, managers and sessions of the course CRM."),
    paths(
        routes::auth::sign_in,
        routes::auth::refresh,
        routes::auth::me,
        routes::auth::sign_out,
        routes::managers::list_managers,
        routes::managers::create_manager,
        routes::managers::activate_request,
        routes::managers::recovery_request,
        routes::managers::activate,
        routes::managers::recover,
        routes::managers::ban,
        routes::managers::unban,
        routes::applications::list_applications,
        routes::applications::my_applications,
        routes::applications::statistics,
        routes::applications::get_application,
        routes::applications::update_application,
        routes::applications::add_comment,
    ),
    components(schemas(
        SignInBody,
        RefreshBody,
        CreateManagerBody,
        PasswordsBody,
        CommentBody,
        ApplicationPatchBody,
        UserDoc,
        TokensDoc,
        SignInDoc,
        ActionLinkDoc,
        ManagerSummaryDoc,
        AuthorDoc,
        CommentDoc,
        ApplicationDoc,
        UserPageDoc,
        ApplicationPageDoc,
        StatisticsDoc,
        ErrorDoc,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Sign-in, token refresh and sign-out"),
        (name = "managers", description = "Manager accounts, administered by admins"),
        (name = "applications", description = "Course applications (leads)"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            BEARER,
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Swagger UI at `/api/docs`, backed by the document at `/api/docs/openapi.json`.
pub fn docs_router() -> Router {
    SwaggerUi::new(DOCS_PATH).url(SPEC_PATH, ApiDoc::openapi()).into()
}

// -------------------------
// Request bodies
// -------------------------

#[derive(Serialize, ToSchema)]
pub struct SignInBody {
    #[schema(example = "admin@school.io")]
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshBody {
    pub refresh_token: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateManagerBody {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// New password and its confirmation; both must match and satisfy the password policy.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordsBody {
    pub first_password: String,
    pub second_password: String,
}

#[derive(Serialize, ToSchema)]
pub struct CommentBody {
    pub text: String,
}

/// Partial update. Absent and `null` fields are left untouched; `""` clears the group.
#[derive(Serialize, ToSchema)]
pub struct ApplicationPatchBody {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub age: Option<i64>,
    pub course: Option<String>,
    pub course_type: Option<String>,
    pub course_format: Option<String>,
    pub status: Option<String>,
    pub sum: Option<i64>,
    pub already_paid: Option<i64>,
    pub group: Option<String>,
}

// -------------------------
// Query strings
// -------------------------

#[derive(IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// 1-based page number.
    pub page: Option<u32>,
    #[param(rename = "pageSize")]
    pub page_size: Option<u32>,
}

/// Filters of the application list. Text filters match case-insensitive substrings.
#[derive(IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ApplicationListParams {
    pub page: Option<u32>,
    #[param(rename = "pageSize")]
    pub page_size: Option<u32>,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub age: Option<String>,
    pub course: Option<String>,
    pub course_type: Option<String>,
    pub course_format: Option<String>,
    pub status: Option<String>,
    pub group: Option<String>,
    /// Manager first name (substring).
    pub manager: Option<String>,
    /// Inclusive lower bound, `YYYY-MM-DD`.
    #[param(rename = "startDate")]
    pub start_date: Option<String>,
    /// Inclusive upper bound, `YYYY-MM-DD`.
    #[param(rename = "endDate")]
    pub end_date: Option<String>,
    /// Field to sort by; defaults to `created_at`.
    pub sort: Option<String>,
    /// `asc` or `desc`.
    pub order: Option<String>,
}

// -------------------------
// Responses
// -------------------------

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[schema(example = "manager")]
    pub role: String,
    pub is_active: bool,
    pub is_banned: bool,
    pub managers: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokensDoc {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Serialize, ToSchema)]
pub struct SignInDoc {
    pub user: UserDoc,
    pub tokens: TokensDoc,
}

#[derive(Serialize, ToSchema)]
pub struct ActionLinkDoc {
    #[schema(example = "Check manager's email")]
    pub message: String,
    pub url: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagerSummaryDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub first_name: String,
    pub email: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub first_name: String,
    pub email: String,
    pub created_at: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub application_id: String,
    pub text: String,
    pub author: Option<AuthorDoc>,
    pub created_at: String,
}

#[derive(Serialize, ToSchema)]
pub struct ApplicationDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: String,
    pub age: i64,
    pub course: String,
    pub course_type: String,
    pub course_format: String,
    pub status: Option<String>,
    pub sum: Option<i64>,
    pub already_paid: Option<i64>,
    pub group: Option<String>,
    pub manager: Option<ManagerSummaryDoc>,
    pub utm: String,
    pub msg: Option<String>,
    pub comments: Vec<CommentDoc>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserPageDoc {
    pub total_items: u64,
    pub total_pages: u64,
    pub prev_page: bool,
    pub next_page: bool,
    pub data: Vec<UserDoc>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPageDoc {
    pub total_items: u64,
    pub total_pages: u64,
    pub prev_page: bool,
    pub next_page: bool,
    pub data: Vec<ApplicationDoc>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsDoc {
    pub total: u64,
    pub in_work: u64,
    pub new: u64,
    pub agree: u64,
    pub disagree: u64,
    pub dubbing: u64,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorDoc {
    #[schema(example = "validation_error")]
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for path in [
            "/api/auth/sign-in",
            "/api/auth/refresh",
            "/api/auth/me",
            "/api/auth/sign-out",
            "/api/manager/admins",
            "/api/manager/create",
            "/api/manager/activate-request/{id}",
            "/api/manager/recovery-request/{id}",
            "/api/manager/activate/{token}",
            "/api/manager/recovery/{token}",
            "/api/manager/ban/{id}",
            "/api/manager/unban/{id}",
            "/api/applications",
            "/api/applications/my-applications",
            "/api/applications/stats",
            "/api/applications/{id}",
            "/api/applications/update/{id}",
            "/api/applications/addcomm/{id}",
        ] {
            assert!(paths.contains(&path), "{path} missing from the document");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key(BEARER));
        assert!(components.schemas.contains_key("ApplicationDoc"));
    }
}
