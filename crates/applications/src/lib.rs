//! Applications domain module (leads, their comments, list queries, statistics).
//!
//! This crate contains business rules for applications, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod application;
pub mod comment;
pub mod course;
pub mod query;
pub mod statistics;

pub use application::{Application, ApplicationPatch, ApplicationUpdate, NewApplication};
pub use comment::{Comment, NewComment};
pub use course::{ApplicationStatus, Course, CourseFormat, CourseType};
pub use query::{ApplicationFilter, ApplicationQuery, ApplicationQueryParams, SortField, SortOrder};
pub use statistics::StatusStatistics;
