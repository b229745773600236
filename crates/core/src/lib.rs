//! `crm-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, pagination and field validators.

pub mod error;
pub mod id;
pub mod pagination;
pub mod validate;

pub use error::{DomainError, DomainResult};
pub use id::{ApplicationId, CommentId, UserId};
pub use pagination::{PageRequest, Paginated};
