use axum::{routing::get, Router};

use crate::middleware::AuthState;

pub mod applications;
pub mod auth;
pub mod common;
pub mod managers;
pub mod system;

/// Router for everything under `/api`.
pub fn router(auth: AuthState) -> Router {
    Router::new()
        .nest("/auth", auth::router(auth.clone()))
        .nest("/manager", managers::router(auth.clone()))
        .nest("/applications", applications::router(auth))
}

/// Unauthenticated operational endpoints.
pub fn system_router() -> Router {
    Router::new().route("/health", get(system::health))
}
