//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: business operations over the repositories, token service and mailer
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses
//! - `openapi.rs`: OpenAPI document and Swagger UI

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    Extension, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::AuthState;

pub mod dto;
pub mod errors;
pub mod openapi;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let auth_state = AuthState {
        services: services.clone(),
    };
    let cors = build_cors_layer(services.frontend_url());

    Router::new()
        .nest("/api", routes::router(auth_state))
        .merge(routes::system_router())
        .merge(openapi::docs_router())
        .layer(Extension(services))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Allow the configured frontend origin only.
fn build_cors_layer(frontend_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match frontend_url.parse::<HeaderValue>() {
        Ok(origin) => {
            tracing::info!("CORS: allowing origin {}", frontend_url);
            cors.allow_origin(origin)
        }
        Err(e) => {
            tracing::warn!("CORS: invalid frontend origin '{}': {}; cross-origin requests disabled", frontend_url, e);
            cors
        }
    }
}
