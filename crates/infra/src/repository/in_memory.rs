//! In-memory repositories for tests/dev.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crm_applications::{Application, ApplicationQuery, Comment, StatusStatistics};
use crm_auth::{TokenKind, User};
use crm_core::{ApplicationId, CommentId, PageRequest, UserId};

use super::{
    ApplicationRepository, CommentRepository, Mutation, RepoError, RepoResult, StoredActionToken,
    StoredTokenPair, TokenRepository, UserRepository,
};

fn poisoned<T>(_: PoisonError<T>) -> RepoError {
    RepoError::Backend("in-memory lock poisoned".to_string())
}

fn page_of<T>(items: Vec<T>, page: PageRequest) -> Vec<T> {
    let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    items.into_iter().skip(skip).take(page.page_size() as usize).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get(&self, id: UserId) -> RepoResult<Option<User>> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn get_many(&self, ids: &[UserId]) -> RepoResult<Vec<User>> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn insert(&self, user: &User) -> RepoResult<()> {
        let mut users = self.users.write().map_err(poisoned)?;
        if users.contains_key(&user.id) {
            return Err(RepoError::Conflict(format!("user {} already exists", user.id)));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(RepoError::Conflict(format!("email {} is already in use", user.email)));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn modify(&self, id: UserId, mutation: Mutation<User>) -> RepoResult<Option<User>> {
        let mut users = self.users.write().map_err(poisoned)?;
        let Some(current) = users.get(&id) else {
            return Ok(None);
        };
        let mut next = current.clone();
        mutation(&mut next)?;
        if users.values().any(|u| u.id != id && u.email == next.email) {
            return Err(RepoError::Conflict(format!("email {} is already in use", next.email)));
        }
        users.insert(id, next.clone());
        Ok(Some(next))
    }

    async fn list_by_ids(&self, ids: &[UserId], page: PageRequest) -> RepoResult<(Vec<User>, u64)> {
        let users = self.users.read().map_err(poisoned)?;
        let mut matching: Vec<User> = ids.iter().filter_map(|id| users.get(id).cloned()).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        let total = matching.len() as u64;
        Ok((page_of(matching, page), total))
    }

    async fn find_ids_by_first_name(&self, needle: &str) -> RepoResult<Vec<UserId>> {
        let needle = needle.to_lowercase();
        let users = self.users.read().map_err(poisoned)?;
        Ok(users
            .values()
            .filter(|u| u.first_name.to_lowercase().contains(&needle))
            .map(|u| u.id)
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Applications
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryApplicationRepository {
    applications: RwLock<HashMap<ApplicationId, Application>>,
}

impl InMemoryApplicationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ApplicationRepository for InMemoryApplicationRepository {
    async fn insert(&self, application: &Application) -> RepoResult<()> {
        let mut apps = self.applications.write().map_err(poisoned)?;
        if apps.contains_key(&application.id) {
            return Err(RepoError::Conflict(format!("application {} already exists", application.id)));
        }
        apps.insert(application.id, application.clone());
        Ok(())
    }

    async fn get(&self, id: ApplicationId) -> RepoResult<Option<Application>> {
        let apps = self.applications.read().map_err(poisoned)?;
        Ok(apps.get(&id).cloned())
    }

    async fn modify(
        &self,
        id: ApplicationId,
        mutation: Mutation<Application>,
    ) -> RepoResult<Option<Application>> {
        let mut apps = self.applications.write().map_err(poisoned)?;
        let Some(slot) = apps.get_mut(&id) else {
            return Ok(None);
        };
        let mut next = slot.clone();
        mutation(&mut next)?;
        *slot = next.clone();
        Ok(Some(next))
    }

    async fn list(&self, query: &ApplicationQuery) -> RepoResult<(Vec<Application>, u64)> {
        let apps = self.applications.read().map_err(poisoned)?;
        let mut matching: Vec<Application> =
            apps.values().filter(|a| query.filter.matches(a)).cloned().collect();
        matching.sort_by(|a, b| query.compare(a, b));
        let total = matching.len() as u64;
        Ok((page_of(matching, query.page), total))
    }

    async fn statistics(&self) -> RepoResult<StatusStatistics> {
        let apps = self.applications.read().map_err(poisoned)?;
        Ok(apps.values().map(|a| a.status).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Comments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryCommentRepository {
    comments: RwLock<HashMap<CommentId, Comment>>,
}

impl InMemoryCommentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CommentRepository for InMemoryCommentRepository {
    async fn insert(&self, comment: &Comment) -> RepoResult<()> {
        let mut comments = self.comments.write().map_err(poisoned)?;
        comments.insert(comment.id, comment.clone());
        Ok(())
    }

    async fn get_many(&self, ids: &[CommentId]) -> RepoResult<Vec<Comment>> {
        let comments = self.comments.read().map_err(poisoned)?;
        Ok(ids.iter().filter_map(|id| comments.get(id).cloned()).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tokens
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryTokenRepository {
    /// Keyed by access token.
    pairs: RwLock<HashMap<String, StoredTokenPair>>,
    actions: RwLock<HashMap<(TokenKind, String), StoredActionToken>>,
}

impl InMemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune_expired(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let mut removed = 0u64;
        {
            let mut pairs = self.pairs.write().map_err(poisoned)?;
            let before = pairs.len();
            pairs.retain(|_, p| p.expires_at > now);
            removed += (before - pairs.len()) as u64;
        }
        let mut actions = self.actions.write().map_err(poisoned)?;
        let before = actions.len();
        actions.retain(|_, a| a.expires_at > now);
        removed += (before - actions.len()) as u64;
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl TokenRepository for InMemoryTokenRepository {
    async fn save_pair(&self, pair: StoredTokenPair) -> RepoResult<()> {
        let pruned = self.prune_expired(pair.created_at)?;
        if pruned > 0 {
            tracing::debug!(pruned, "dropped expired tokens");
        }
        let mut pairs = self.pairs.write().map_err(poisoned)?;
        pairs.insert(pair.access_token.clone(), pair);
        Ok(())
    }

    async fn find_by_access(&self, access_token: &str) -> RepoResult<Option<StoredTokenPair>> {
        let pairs = self.pairs.read().map_err(poisoned)?;
        Ok(pairs.get(access_token).cloned())
    }

    async fn find_by_refresh(&self, refresh_token: &str) -> RepoResult<Option<StoredTokenPair>> {
        let pairs = self.pairs.read().map_err(poisoned)?;
        Ok(pairs.values().find(|p| p.refresh_token == refresh_token).cloned())
    }

    async fn delete_pair(&self, access_token: &str) -> RepoResult<bool> {
        let mut pairs = self.pairs.write().map_err(poisoned)?;
        Ok(pairs.remove(access_token).is_some())
    }

    async fn delete_all_for_user(&self, user_id: UserId) -> RepoResult<u64> {
        let mut removed = 0u64;
        {
            let mut pairs = self.pairs.write().map_err(poisoned)?;
            let before = pairs.len();
            pairs.retain(|_, p| p.user_id != user_id);
            removed += (before - pairs.len()) as u64;
        }
        let mut actions = self.actions.write().map_err(poisoned)?;
        let before = actions.len();
        actions.retain(|_, a| a.user_id != user_id);
        removed += (before - actions.len()) as u64;
        Ok(removed)
    }

    async fn save_action(&self, token: StoredActionToken) -> RepoResult<()> {
        let pruned = self.prune_expired(token.created_at)?;
        if pruned > 0 {
            tracing::debug!(pruned, "dropped expired tokens");
        }
        let mut actions = self.actions.write().map_err(poisoned)?;
        actions.insert((token.kind, token.token.clone()), token);
        Ok(())
    }

    async fn take_action(&self, kind: TokenKind, token: &str) -> RepoResult<Option<UserId>> {
        let mut actions = self.actions.write().map_err(poisoned)?;
        Ok(actions.remove(&(kind, token.to_string())).map(|a| a.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use crm_applications::{
        ApplicationQueryParams, ApplicationStatus, Course, CourseFormat, CourseType, NewApplication,
    };
    use crm_auth::{NewManager, TokenPair};
    use crm_core::DomainError;

    fn stored_pair(user: UserId, access: &str, refresh: &str, created_at: DateTime<Utc>) -> StoredTokenPair {
        let pair = TokenPair { access_token: access.into(), refresh_token: refresh.into() };
        StoredTokenPair::new(user, &pair, created_at, created_at + Duration::days(30))
    }

    fn action(user: UserId, kind: TokenKind, token: &str, created_at: DateTime<Utc>) -> StoredActionToken {
        StoredActionToken {
            user_id: user,
            kind,
            token: token.into(),
            created_at,
            expires_at: created_at + Duration::hours(1),
        }
    }

    fn manager(email: &str, first: &str, offset_secs: i64) -> User {
        let now = Utc::now() + Duration::seconds(offset_secs);
        User::new_manager(NewManager::parse(email, first, "Koval").unwrap(), now)
    }

    fn lead(name: &str, status: Option<ApplicationStatus>) -> Application {
        Application::new(
            NewApplication {
                name: name.into(),
                surname: "Bondar".into(),
                email: "lead@mail.io".into(),
                phone: "380501112233".into(),
                age: 30,
                course: Course::Qacx,
                course_type: CourseType::Vip,
                course_format: CourseFormat::Online,
                status,
                sum: None,
                already_paid: None,
                utm: "google".into(),
                msg: None,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let repo = InMemoryUserRepository::new();
        repo.insert(&manager("olena@school.io", "Olena", 0)).await.unwrap();
        let err = repo.insert(&manager("olena@school.io", "Iryna", 1)).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_by_ids_is_newest_first_and_paged() {
        let repo = InMemoryUserRepository::new();
        let mut ids = Vec::new();
        for (i, name) in ["Anna", "Bohdan", "Vira"].iter().enumerate() {
            let u = manager(&format!("{}@school.io", name.to_lowercase()), name, i as i64);
            ids.push(u.id);
            repo.insert(&u).await.unwrap();
        }
        repo.insert(&manager("other@school.io", "Other", 10)).await.unwrap();

        let page = PageRequest::new(Some(1), Some(2), 10).unwrap();
        let (users, total) = repo.list_by_ids(&ids, page).await.unwrap();
        assert_eq!(total, 3);
        let names: Vec<_> = users.iter().map(|u| u.first_name.as_str()).collect();
        assert_eq!(names, vec!["Vira", "Bohdan"]);
    }

    #[tokio::test]
    async fn first_name_search_is_case_insensitive() {
        let repo = InMemoryUserRepository::new();
        let olena = manager("olena@school.io", "Olena", 0);
        repo.insert(&olena).await.unwrap();
        repo.insert(&manager("ivan@school.io", "Ivan", 0)).await.unwrap();
        assert_eq!(repo.find_ids_by_first_name("LEN").await.unwrap(), vec![olena.id]);
    }

    #[tokio::test]
    async fn application_list_filters_and_counts() {
        let repo = InMemoryApplicationRepository::new();
        repo.insert(&lead("Taras", Some(ApplicationStatus::New))).await.unwrap();
        repo.insert(&lead("Oksana", Some(ApplicationStatus::Agree))).await.unwrap();
        repo.insert(&lead("Taisia", None)).await.unwrap();

        let query = ApplicationQueryParams { name: Some("ta".into()), ..Default::default() }
            .parse()
            .unwrap();
        let (apps, total) = repo.list(&query).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(apps.len(), 2);

        let stats = repo.statistics().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.new, 1);
        assert_eq!(stats.agree, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_modifications_are_not_lost() {
        let repo = Arc::new(InMemoryApplicationRepository::new());
        let app = lead("Taras", None);
        repo.insert(&app).await.unwrap();
        let id = app.id;

        let tasks: Vec<_> = (0..200)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.modify(
                        id,
                        Box::new(|a: &mut Application| {
                            a.comments.push(CommentId::new());
                            Ok(())
                        }),
                    )
                    .await
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_some());
        }

        let stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.comments.len(), 200);
    }

    #[tokio::test]
    async fn rejected_modification_leaves_record_untouched() {
        let repo = InMemoryUserRepository::new();
        let user = manager("olena@school.io", "Olena", 0);
        repo.insert(&user).await.unwrap();

        let err = repo
            .modify(
                user.id,
                Box::new(|u: &mut User| {
                    u.first_name = "Changed".into();
                    Err(DomainError::forbidden("no"))
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err, RepoError::Domain(DomainError::forbidden("no")));
        assert_eq!(repo.get(user.id).await.unwrap().unwrap().first_name, "Olena");

        let missing = repo.modify(UserId::new(), Box::new(|_: &mut User| Ok(()))).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn modification_cannot_take_another_users_email() {
        let repo = InMemoryUserRepository::new();
        let olena = manager("olena@school.io", "Olena", 0);
        let ivan = manager("ivan@school.io", "Ivan", 0);
        repo.insert(&olena).await.unwrap();
        repo.insert(&ivan).await.unwrap();

        let err = repo
            .modify(
                ivan.id,
                Box::new(|u: &mut User| {
                    u.email = "olena@school.io".into();
                    Ok(())
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
    }

    #[tokio::test]
    async fn saving_a_token_prunes_expired_ones() {
        let repo = InMemoryTokenRepository::new();
        let user = UserId::new();
        let long_ago = Utc::now() - Duration::days(60);

        repo.save_pair(stored_pair(user, "old-a", "old-r", long_ago)).await.unwrap();
        repo.save_action(action(user, TokenKind::Recovery, "old-act", long_ago)).await.unwrap();
        assert!(repo.find_by_access("old-a").await.unwrap().is_some());

        let now = Utc::now();
        repo.save_pair(stored_pair(user, "new-a", "new-r", now)).await.unwrap();

        assert!(repo.find_by_access("old-a").await.unwrap().is_none());
        assert!(repo.find_by_access("new-a").await.unwrap().is_some());
        assert_eq!(repo.take_action(TokenKind::Recovery, "old-act").await.unwrap(), None);

        repo.save_action(action(user, TokenKind::Activate, "fresh", now)).await.unwrap();
        assert!(repo.find_by_refresh("new-r").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn action_tokens_are_single_use() {
        let repo = InMemoryTokenRepository::new();
        let user = UserId::new();
        repo.save_action(action(user, TokenKind::Activate, "tok", Utc::now())).await.unwrap();

        assert_eq!(repo.take_action(TokenKind::Recovery, "tok").await.unwrap(), None);
        assert_eq!(repo.take_action(TokenKind::Activate, "tok").await.unwrap(), Some(user));
        assert_eq!(repo.take_action(TokenKind::Activate, "tok").await.unwrap(), None);
    }

    #[tokio::test]
    async fn revoking_a_user_removes_all_their_tokens() {
        let repo = InMemoryTokenRepository::new();
        let user = UserId::new();
        let other = UserId::new();
        let now = Utc::now();

        repo.save_pair(stored_pair(user, "a1", "r1", now)).await.unwrap();
        repo.save_pair(stored_pair(user, "a2", "r2", now)).await.unwrap();
        repo.save_pair(stored_pair(other, "a3", "r3", now)).await.unwrap();
        repo.save_action(action(user, TokenKind::Recovery, "act", now)).await.unwrap();

        assert_eq!(repo.delete_all_for_user(user).await.unwrap(), 3);
        assert!(repo.find_by_refresh("r1").await.unwrap().is_none());
        assert!(repo.find_by_access("a3").await.unwrap().is_some());
    }
}
