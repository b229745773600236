use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use thiserror::Error;

use crm_auth::{AuthzError, PasswordError, TokenError};
use crm_core::DomainError;
use crm_infra::{MailError, RepoError};

/// Failure of a service operation, mapped onto one HTTP error body.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Authz(#[from] AuthzError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
}

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(e) => match e {
            DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
            DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
            DomainError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", e.to_string()),
            DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
            DomainError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
            DomainError::InvariantViolation(msg) => {
                json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
            }
        },
        ServiceError::Repo(e) => match e {
            RepoError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", e.to_string()),
            RepoError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
            RepoError::Backend(msg) => {
                tracing::error!(error = %msg, "storage failure");
                internal_error()
            }
            RepoError::Domain(e) => service_error_to_response(ServiceError::Domain(e)),
        },
        ServiceError::Token(e) => json_error(StatusCode::UNAUTHORIZED, "unauthorized", e.to_string()),
        ServiceError::Unauthorized(msg) => json_error(StatusCode::UNAUTHORIZED, "unauthorized", msg),
        ServiceError::Authz(e) => json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()),
        ServiceError::Password(e) => {
            tracing::error!(error = %e, "stored password hash is unusable");
            internal_error()
        }
        ServiceError::Mail(e) => {
            tracing::error!(error = %e, "mail delivery failed");
            internal_error()
        }
        ServiceError::Internal(msg) => {
            tracing::error!(error = %msg, "internal error");
            internal_error()
        }
    }
}

/// Body or query string that could not be decoded.
pub fn rejection_to_response(rejection: impl core::fmt::Display) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.to_string())
}

fn internal_error() -> axum::response::Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal server error")
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
