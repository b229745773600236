//! Storage abstractions for accounts, applications, comments and issued tokens.
//!
//! Services depend on these traits only; the in-memory backend serves tests and
//! local development, the Postgres backend (feature `postgres`) serves production.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crm_applications::{Application, ApplicationQuery, Comment, StatusStatistics};
use crm_auth::{TokenKind, TokenPair, User};
use crm_core::{ApplicationId, CommentId, DomainError, DomainResult, PageRequest, UserId};

pub use in_memory::{
    InMemoryApplicationRepository, InMemoryCommentRepository, InMemoryTokenRepository,
    InMemoryUserRepository,
};
#[cfg(feature = "postgres")]
pub use postgres::PostgresRepository;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepoError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Backend(String),
    /// A mutation passed to `modify` refused the change.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// In-place change applied by `modify` while the record is held exclusively.
///
/// Returning an error leaves the stored record untouched.
pub type Mutation<T> = Box<dyn FnOnce(&mut T) -> DomainResult<()> + Send>;

/// An issued access/refresh pair and its owner.
///
/// `expires_at` is the refresh token's expiry; past it the pair is useless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTokenPair {
    pub user_id: UserId,
    pub access_token: String,
    pub refresh_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredTokenPair {
    pub fn new(
        user_id: UserId,
        pair: &TokenPair,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            created_at,
            expires_at,
        }
    }
}

/// A single-use activation or recovery token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredActionToken {
    pub user_id: UserId,
    pub kind: TokenKind,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, id: UserId) -> RepoResult<Option<User>>;

    /// Lookup by normalized email.
    async fn get_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    /// Users for the given ids; unknown ids are skipped.
    async fn get_many(&self, ids: &[UserId]) -> RepoResult<Vec<User>>;

    /// Fails with `Conflict` when the email is taken.
    async fn insert(&self, user: &User) -> RepoResult<()>;

    /// Apply `mutation` to the stored user atomically; `None` when the id is unknown.
    async fn modify(&self, id: UserId, mutation: Mutation<User>) -> RepoResult<Option<User>>;

    /// Page through the given users, newest first.
    async fn list_by_ids(&self, ids: &[UserId], page: PageRequest) -> RepoResult<(Vec<User>, u64)>;

    /// Ids of users whose first name contains `needle` (case-insensitive).
    async fn find_ids_by_first_name(&self, needle: &str) -> RepoResult<Vec<UserId>>;
}

#[async_trait::async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn insert(&self, application: &Application) -> RepoResult<()>;

    async fn get(&self, id: ApplicationId) -> RepoResult<Option<Application>>;

    /// Apply `mutation` to the stored application atomically; `None` when the id is unknown.
    async fn modify(
        &self,
        id: ApplicationId,
        mutation: Mutation<Application>,
    ) -> RepoResult<Option<Application>>;

    /// One page of matching applications plus the total match count.
    ///
    /// `query.filter.manager_name` must already be resolved into `managers`.
    async fn list(&self, query: &ApplicationQuery) -> RepoResult<(Vec<Application>, u64)>;

    async fn statistics(&self) -> RepoResult<StatusStatistics>;
}

#[async_trait::async_trait]
pub trait CommentRepository: Send + Sync {
    async fn insert(&self, comment: &Comment) -> RepoResult<()>;

    /// Comments in the order of `ids`; unknown ids are skipped.
    async fn get_many(&self, ids: &[CommentId]) -> RepoResult<Vec<Comment>>;
}

/// Persisted tokens. A token that is not stored here is no longer honoured.
///
/// Saving a token also drops every stored token that expired before its `created_at`.
#[async_trait::async_trait]
pub trait TokenRepository: Send + Sync {
    async fn save_pair(&self, pair: StoredTokenPair) -> RepoResult<()>;

    async fn find_by_access(&self, access_token: &str) -> RepoResult<Option<StoredTokenPair>>;

    async fn find_by_refresh(&self, refresh_token: &str) -> RepoResult<Option<StoredTokenPair>>;

    /// Remove the pair owning `access_token`; returns whether one was removed.
    async fn delete_pair(&self, access_token: &str) -> RepoResult<bool>;

    /// Remove every pair and action token of a user; returns how many were removed.
    async fn delete_all_for_user(&self, user_id: UserId) -> RepoResult<u64>;

    async fn save_action(&self, token: StoredActionToken) -> RepoResult<()>;

    /// Remove and return the owner of an action token, if it was stored.
    async fn take_action(&self, kind: TokenKind, token: &str) -> RepoResult<Option<UserId>>;
}

/// The full set of repositories a service needs.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub applications: Arc<dyn ApplicationRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub tokens: Arc<dyn TokenRepository>,
}

impl Repositories {
    /// Fresh in-memory repositories.
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserRepository::new()),
            applications: Arc::new(InMemoryApplicationRepository::new()),
            comments: Arc::new(InMemoryCommentRepository::new()),
            tokens: Arc::new(InMemoryTokenRepository::new()),
        }
    }

    #[cfg(feature = "postgres")]
    pub fn postgres(repo: PostgresRepository) -> Self {
        let repo = Arc::new(repo);
        Self {
            users: repo.clone(),
            applications: repo.clone(),
            comments: repo.clone(),
            tokens: repo,
        }
    }
}
