//! Business operations behind the HTTP handlers.
//!
//! Handlers stay thin: they parse the request, call one method here and map the
//! result. Everything that touches storage, tokens or mail lives in `AppServices`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use crm_applications::{
    Application, ApplicationPatch, ApplicationQueryParams, Comment, NewComment, StatusStatistics,
};
use crm_auth::{
    Hs256TokenService, JwtValidator, NewManager, PasswordHasher, PasswordPair, Principal, TokenKind,
    TokenPair, User,
};
use crm_core::{ApplicationId, CommentId, DomainError, PageRequest, Paginated, UserId};
use crm_infra::{
    AppConfig, Email, EmailTemplate, Mailer, Mutation, Repositories, StoredActionToken, StoredTokenPair,
};

use crate::app::dto::{ApplicationView, CommentView};
use crate::app::errors::ServiceError;
use crate::context::PrincipalContext;

pub type ServiceResult<T> = Result<T, ServiceError>;

pub const MANAGER_PAGE_SIZE: u32 = 10;

const BAD_CREDENTIALS: &str = "Invalid email or password";
const BAD_ACTION_TOKEN: &str = "Token is invalid or has already been used";

/// Result of a successful sign-in.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub user: User,
    pub tokens: TokenPair,
}

pub struct AppServices {
    repos: Repositories,
    tokens: Hs256TokenService,
    hasher: PasswordHasher,
    mailer: Arc<dyn Mailer>,
    frontend_url: String,
}

impl AppServices {
    pub fn new(
        repos: Repositories,
        tokens: Hs256TokenService,
        hasher: PasswordHasher,
        mailer: Arc<dyn Mailer>,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            repos,
            tokens,
            hasher,
            mailer,
            frontend_url: frontend_url.into(),
        }
    }

    pub fn from_config(config: &AppConfig, repos: Repositories, mailer: Arc<dyn Mailer>) -> Self {
        Self::new(
            repos,
            Hs256TokenService::new(&config.secrets, config.ttls),
            PasswordHasher::new(config.password_hash_iterations),
            mailer,
            config.frontend_url.clone(),
        )
    }

    pub fn frontend_url(&self) -> &str {
        &self.frontend_url
    }

    async fn hash_password(&self, password: String) -> ServiceResult<String> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ServiceError::Internal(format!("password hashing task failed: {e}")))
    }

    async fn verify_password(&self, password: String, encoded: String) -> ServiceResult<bool> {
        let hasher = self.hasher;
        let verified = tokio::task::spawn_blocking(move || hasher.verify(&password, &encoded))
            .await
            .map_err(|e| ServiceError::Internal(format!("password verification task failed: {e}")))?;
        Ok(verified?)
    }

    async fn user_or_404(&self, id: UserId) -> ServiceResult<User> {
        self.repos
            .users
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Manager").into())
    }

    async fn modify_user(&self, id: UserId, mutation: Mutation<User>) -> ServiceResult<User> {
        self.repos
            .users
            .modify(id, mutation)
            .await?
            .ok_or_else(|| DomainError::not_found("Manager").into())
    }

    async fn issue_session(&self, user: &User) -> ServiceResult<TokenPair> {
        let now = Utc::now();
        let pair = self.tokens.issue_pair(user.id, user.role, now)?;
        let expires_at = self.tokens.expires_at(TokenKind::Refresh, now);
        self.repos
            .tokens
            .save_pair(StoredTokenPair::new(user.id, &pair, now, expires_at))
            .await?;
        Ok(pair)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authentication
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve a bearer access token to the calling principal.
    ///
    /// The token must verify, still be stored, and belong to an active, unbanned user.
    pub async fn authenticate(&self, access_token: &str) -> ServiceResult<PrincipalContext> {
        let claims = self.tokens.validate(access_token, TokenKind::Access, Utc::now())?;

        let stored = self
            .repos
            .tokens
            .find_by_access(access_token)
            .await?
            .filter(|p| p.user_id == claims.sub)
            .ok_or_else(|| ServiceError::unauthorized("Token is not active"))?;

        let user = self
            .repos
            .users
            .get(stored.user_id)
            .await?
            .ok_or_else(|| ServiceError::unauthorized("Token owner no longer exists"))?;
        if user.is_banned || !user.is_active {
            return Err(ServiceError::unauthorized("Account is not allowed to sign in"));
        }

        Ok(PrincipalContext::new(
            Principal::new(user.id, user.role),
            access_token.to_string(),
        ))
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> ServiceResult<SignIn> {
        let email = crm_core::validate::normalize_email(email)?;
        let user = self
            .repos
            .users
            .get_by_email(&email)
            .await?
            .ok_or_else(|| ServiceError::unauthorized(BAD_CREDENTIALS))?;

        user.ensure_can_sign_in()?;

        let hash = user
            .password_hash
            .clone()
            .ok_or_else(|| ServiceError::unauthorized(BAD_CREDENTIALS))?;
        if !self.verify_password(password.to_string(), hash).await? {
            tracing::info!(user_id = %user.id, "sign-in rejected: wrong password");
            return Err(ServiceError::unauthorized(BAD_CREDENTIALS));
        }

        let tokens = self.issue_session(&user).await?;
        tracing::info!(user_id = %user.id, role = %user.role, "signed in");
        Ok(SignIn { user, tokens })
    }

    /// Rotate a refresh token: the presented pair is revoked and a new one issued.
    pub async fn refresh(&self, refresh_token: &str) -> ServiceResult<TokenPair> {
        let claims = self.tokens.validate(refresh_token, TokenKind::Refresh, Utc::now())?;

        let stored = self
            .repos
            .tokens
            .find_by_refresh(refresh_token)
            .await?
            .filter(|p| p.user_id == claims.sub)
            .ok_or_else(|| ServiceError::unauthorized("Token is not active"))?;

        let user = self
            .repos
            .users
            .get(stored.user_id)
            .await?
            .ok_or_else(|| ServiceError::unauthorized("Token owner no longer exists"))?;
        user.ensure_can_sign_in()?;

        // A concurrent refresh may have rotated the pair already.
        if !self.repos.tokens.delete_pair(&stored.access_token).await? {
            return Err(ServiceError::unauthorized("Token is not active"));
        }
        self.issue_session(&user).await
    }

    pub async fn me(&self, principal: &Principal) -> ServiceResult<User> {
        self.user_or_404(principal.user_id).await
    }

    pub async fn sign_out(&self, ctx: &PrincipalContext) -> ServiceResult<()> {
        self.repos.tokens.delete_pair(ctx.access_token()).await?;
        tracing::info!(user_id = %ctx.principal().user_id, "signed out");
        Ok(())
    }

    /// Create the bootstrap admin unless an account with that email exists.
    pub async fn seed_admin(&self, email: &str, password: &str) -> ServiceResult<User> {
        let email = crm_core::validate::normalize_email(email)?;
        if let Some(existing) = self.repos.users.get_by_email(&email).await? {
            return Ok(existing);
        }
        let hash = self.hash_password(password.to_string()).await?;
        let admin = User::new_admin(&email, "Admin", "Admin", hash, Utc::now())?;
        self.repos.users.insert(&admin).await?;
        tracing::info!(user_id = %admin.id, email = %admin.email, "bootstrap admin created");
        Ok(admin)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Managers
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_managers(
        &self,
        admin: &Principal,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> ServiceResult<Paginated<User>> {
        let page = PageRequest::new(page, page_size, MANAGER_PAGE_SIZE)?;
        let admin = self.user_or_404(admin.user_id).await?;
        let (users, total) = self.repos.users.list_by_ids(&admin.managers, page).await?;
        Ok(Paginated::new(users, total, page))
    }

    #[tracing::instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn create_manager(
        &self,
        admin: &Principal,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> ServiceResult<User> {
        let input = NewManager::parse(email, first_name, last_name)?;
        if self.repos.users.get_by_email(&input.email).await?.is_some() {
            return Err(DomainError::conflict("User with this email already exists").into());
        }

        let now = Utc::now();
        let manager = User::new_manager(input, now);
        self.repos.users.insert(&manager).await?;

        let manager_id = manager.id;
        self.modify_user(
            admin.user_id,
            Box::new(move |creator: &mut User| {
                creator.add_managed(manager_id, now);
                Ok(())
            }),
        )
        .await?;

        tracing::info!(manager_id = %manager.id, "manager created");
        Ok(manager)
    }

    /// Issue an action token for a manager and mail them the link. Returns the link.
    pub async fn request_action(&self, manager_id: UserId, kind: TokenKind) -> ServiceResult<String> {
        let (template, path) = match kind {
            TokenKind::Activate => (EmailTemplate::Activate, "activate"),
            TokenKind::Recovery => (EmailTemplate::Recovery, "recovery"),
            other => {
                return Err(ServiceError::Internal(format!("{other} is not an action token kind")));
            }
        };

        let manager = self.user_or_404(manager_id).await?;
        let now = Utc::now();
        let token = self.tokens.issue(manager.id, manager.role, kind, now)?;
        self.repos
            .tokens
            .save_action(StoredActionToken {
                user_id: manager.id,
                kind,
                token: token.clone(),
                created_at: now,
                expires_at: self.tokens.expires_at(kind, now),
            })
            .await?;

        let url = format!("{}/{}/{}", self.frontend_url, path, token);
        self.mailer
            .send(Email::render(template, &manager.email, &manager.first_name, &url))
            .await?;

        tracing::info!(manager_id = %manager.id, kind = %kind, "action link sent");
        Ok(url)
    }

    /// Check an action token and the new password, then consume the token.
    ///
    /// Returns the token owner and the hash of the new password.
    async fn redeem_action(
        &self,
        token: &str,
        kind: TokenKind,
        passwords: PasswordPair,
    ) -> ServiceResult<(UserId, String)> {
        let claims = self.tokens.validate(token, kind, Utc::now())?;
        let password = passwords.into_password()?;

        let owner = self
            .repos
            .tokens
            .take_action(kind, token)
            .await?
            .filter(|owner| *owner == claims.sub)
            .ok_or_else(|| ServiceError::unauthorized(BAD_ACTION_TOKEN))?;

        let hash = self.hash_password(password).await?;
        Ok((owner, hash))
    }

    pub async fn activate(&self, token: &str, passwords: PasswordPair) -> ServiceResult<User> {
        let (owner, hash) = self.redeem_action(token, TokenKind::Activate, passwords).await?;
        let now = Utc::now();
        let user = self
            .modify_user(
                owner,
                Box::new(move |user: &mut User| {
                    user.activate(hash, now);
                    Ok(())
                }),
            )
            .await?;
        tracing::info!(user_id = %user.id, "account activated");
        Ok(user)
    }

    /// Replace the password and revoke every session of the account.
    pub async fn recover(&self, token: &str, passwords: PasswordPair) -> ServiceResult<User> {
        let (owner, hash) = self.redeem_action(token, TokenKind::Recovery, passwords).await?;
        let now = Utc::now();
        let user = self
            .modify_user(
                owner,
                Box::new(move |user: &mut User| {
                    user.set_password(hash, now);
                    Ok(())
                }),
            )
            .await?;
        let revoked = self.repos.tokens.delete_all_for_user(user.id).await?;
        tracing::info!(user_id = %user.id, revoked, "password recovered");
        Ok(user)
    }

    pub async fn ban(&self, manager_id: UserId) -> ServiceResult<()> {
        let now = Utc::now();
        let user = self
            .modify_user(manager_id, Box::new(move |user: &mut User| user.ban(now)))
            .await?;
        let revoked = self.repos.tokens.delete_all_for_user(user.id).await?;
        tracing::info!(user_id = %user.id, revoked, "manager banned");
        Ok(())
    }

    pub async fn unban(&self, manager_id: UserId) -> ServiceResult<()> {
        let now = Utc::now();
        let user = self
            .modify_user(
                manager_id,
                Box::new(move |user: &mut User| {
                    user.unban(now);
                    Ok(())
                }),
            )
            .await?;
        tracing::info!(user_id = %user.id, "manager unbanned");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Applications
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve managers and comment authors for a batch of applications.
    async fn populate(&self, apps: Vec<Application>) -> ServiceResult<Vec<ApplicationView>> {
        let comment_ids: Vec<CommentId> = apps.iter().flat_map(|a| a.comments.iter().copied()).collect();
        let comments_by_id: HashMap<CommentId, Comment> = self
            .repos
            .comments
            .get_many(&comment_ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let user_ids: Vec<UserId> = apps
            .iter()
            .filter_map(|a| a.manager)
            .chain(comments_by_id.values().map(|c| c.author))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let users_by_id: HashMap<UserId, User> = self
            .repos
            .users
            .get_many(&user_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        Ok(apps
            .into_iter()
            .map(|application| {
                let manager = application.manager.and_then(|id| users_by_id.get(&id).cloned());
                let comments = application
                    .comments
                    .iter()
                    .filter_map(|id| comments_by_id.get(id))
                    .map(|comment| CommentView {
                        comment: comment.clone(),
                        author: users_by_id.get(&comment.author).cloned(),
                    })
                    .collect();
                ApplicationView { application, manager, comments }
            })
            .collect())
    }

    async fn populate_one(&self, app: Application) -> ServiceResult<ApplicationView> {
        self.populate(vec![app])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::Internal("populate dropped an application".to_string()))
    }

    async fn application_or_404(&self, id: ApplicationId) -> ServiceResult<Application> {
        self.repos
            .applications
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Application").into())
    }

    async fn modify_application(
        &self,
        id: ApplicationId,
        mutation: Mutation<Application>,
    ) -> ServiceResult<Application> {
        self.repos
            .applications
            .modify(id, mutation)
            .await?
            .ok_or_else(|| DomainError::not_found("Application").into())
    }

    /// List applications; `only_managed_by` narrows to one manager's leads.
    pub async fn list_applications(
        &self,
        params: ApplicationQueryParams,
        only_managed_by: Option<UserId>,
    ) -> ServiceResult<Paginated<ApplicationView>> {
        let mut query = params.parse()?;

        if let Some(needle) = query.filter.manager_name.take() {
            let ids = self.repos.users.find_ids_by_first_name(&needle).await?;
            query.filter.restrict_managers(ids);
        }
        if let Some(manager) = only_managed_by {
            query.filter.restrict_managers(vec![manager]);
        }

        let (apps, total) = self.repos.applications.list(&query).await?;
        let views = self.populate(apps).await?;
        Ok(Paginated::new(views, total, query.page))
    }

    pub async fn get_application(&self, id: ApplicationId) -> ServiceResult<ApplicationView> {
        let app = self.application_or_404(id).await?;
        self.populate_one(app).await
    }

    #[tracing::instrument(skip(self, patch, actor), fields(actor_id = %actor.user_id))]
    pub async fn update_application(
        &self,
        id: ApplicationId,
        patch: ApplicationPatch,
        actor: &Principal,
    ) -> ServiceResult<ApplicationView> {
        let update = patch.validate()?;
        let actor = *actor;
        let now = Utc::now();
        let app = self
            .modify_application(
                id,
                Box::new(move |app: &mut Application| app.apply_update(update, &actor, now)),
            )
            .await?;
        self.populate_one(app).await
    }

    #[tracing::instrument(skip(self, body, actor), fields(actor_id = %actor.user_id))]
    pub async fn add_comment(
        &self,
        id: ApplicationId,
        body: NewComment,
        actor: &Principal,
    ) -> ServiceResult<ApplicationView> {
        let text = body.validate()?;
        let now = Utc::now();
        let comment = Comment::new(id, text, actor.user_id, now);

        let actor = *actor;
        let attached = comment.clone();
        let app = self
            .modify_application(
                id,
                Box::new(move |app: &mut Application| app.add_comment(&attached, &actor, now)),
            )
            .await?;

        self.repos.comments.insert(&comment).await?;
        self.populate_one(app).await
    }

    pub async fn statistics(&self) -> ServiceResult<StatusStatistics> {
        Ok(self.repos.applications.statistics().await?)
    }
}
