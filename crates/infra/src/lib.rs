//! Infrastructure layer: config, storage backends, outbound mail.

pub mod config;
pub mod mailer;
pub mod repository;

pub use config::{AdminBootstrap, AppConfig, ConfigError};
pub use mailer::{Email, EmailTemplate, InMemoryOutbox, LogMailer, MailError, Mailer};
pub use repository::{
    ApplicationRepository, CommentRepository, Mutation, RepoError, RepoResult, Repositories,
    StoredActionToken, StoredTokenPair, TokenRepository, UserRepository,
};
