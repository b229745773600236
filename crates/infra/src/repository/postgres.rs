//! Postgres-backed repositories.
//!
//! All four repository traits are served by one `PostgresRepository` over a
//! shared `PgPool`. Enum columns hold their wire spelling as text.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | RepoError |
//! |------------|----------------------|-----------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | Other | N/A | `Backend` |

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;
use uuid::Uuid;

use crm_applications::{
    Application, ApplicationFilter, ApplicationQuery, ApplicationStatus, Comment, SortField,
    SortOrder, StatusStatistics,
};
use crm_auth::{TokenKind, User};
use crm_core::{ApplicationId, CommentId, PageRequest, UserId};

use super::{
    ApplicationRepository, CommentRepository, Mutation, RepoError, RepoResult, StoredActionToken,
    StoredTokenPair, TokenRepository, UserRepository,
};

/// Schema applied by [`PostgresRepository::migrate`]. Idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            UUID PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT,
    first_name    TEXT NOT NULL,
    last_name     TEXT NOT NULL,
    role          TEXT NOT NULL,
    is_active     BOOLEAN NOT NULL DEFAULT FALSE,
    is_banned     BOOLEAN NOT NULL DEFAULT FALSE,
    managers      UUID[] NOT NULL DEFAULT '{}',
    created_at    TIMESTAMPTZ NOT NULL,
    updated_at    TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS applications (
    id            UUID PRIMARY KEY,
    name          TEXT NOT NULL,
    surname       TEXT NOT NULL,
    email         TEXT NOT NULL,
    phone         TEXT NOT NULL,
    age           BIGINT NOT NULL,
    course        TEXT NOT NULL,
    course_type   TEXT NOT NULL,
    course_format TEXT NOT NULL,
    status        TEXT,
    sum           BIGINT,
    already_paid  BIGINT,
    "group"       TEXT,
    manager_id    UUID REFERENCES users (id),
    utm           TEXT NOT NULL,
    msg           TEXT,
    comment_ids   UUID[] NOT NULL DEFAULT '{}',
    created_at    TIMESTAMPTZ NOT NULL,
    updated_at    TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS applications_created_at_idx ON applications (created_at DESC);
CREATE INDEX IF NOT EXISTS applications_manager_idx ON applications (manager_id);

CREATE TABLE IF NOT EXISTS comments (
    id             UUID PRIMARY KEY,
    application_id UUID NOT NULL REFERENCES applications (id),
    text           TEXT NOT NULL,
    author_id      UUID NOT NULL REFERENCES users (id),
    created_at     TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS token_pairs (
    access_token  TEXT PRIMARY KEY,
    refresh_token TEXT NOT NULL UNIQUE,
    user_id       UUID NOT NULL REFERENCES users (id),
    created_at    TIMESTAMPTZ NOT NULL,
    expires_at    TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS token_pairs_expires_at_idx ON token_pairs (expires_at);

CREATE TABLE IF NOT EXISTS action_tokens (
    kind       TEXT NOT NULL,
    token      TEXT NOT NULL,
    user_id    UUID NOT NULL REFERENCES users (id),
    created_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (kind, token)
);

CREATE INDEX IF NOT EXISTS action_tokens_expires_at_idx ON action_tokens (expires_at);
"#;

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, role, is_active, is_banned, managers, created_at, updated_at";

const PAIR_COLUMNS: &str = "access_token, refresh_token, user_id, created_at, expires_at";

const APPLICATION_COLUMNS: &str = r#"id, name, surname, email, phone, age, course, course_type, course_format, status, sum, already_paid, "group", manager_id, utm, msg, comment_ids, created_at, updated_at"#;

#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply the schema.
    pub async fn connect(database_url: &str) -> RepoResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let repo = Self::new(pool);
        repo.migrate().await?;
        Ok(repo)
    }

    async fn begin(&self, operation: &str) -> RepoResult<sqlx::Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(|e| map_sqlx_error(operation, e))
    }

    /// Delete tokens whose expiry is not after `now`.
    async fn prune_expired(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let pairs = sqlx::query("DELETE FROM token_pairs WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("prune_token_pairs", e))?;
        let actions = sqlx::query("DELETE FROM action_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("prune_action_tokens", e))?;
        let pruned = pairs.rows_affected() + actions.rows_affected();
        if pruned > 0 {
            tracing::debug!(pruned, "dropped expired tokens");
        }
        Ok(pruned)
    }

    pub async fn migrate(&self) -> RepoResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => RepoError::Conflict(msg),
                _ => RepoError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            RepoError::Backend(format!("connection pool closed in {}", operation))
        }
        other => RepoError::Backend(format!("sqlx error in {}: {}", operation, other)),
    }
}

fn column<T>(row: &PgRow, name: &str) -> RepoResult<T>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<T, _>(name)
        .map_err(|e| RepoError::Backend(format!("bad column {name}: {e}")))
}

fn parsed<T: FromStr>(row: &PgRow, name: &str) -> RepoResult<T>
where
    T::Err: core::fmt::Display,
{
    let raw: String = column(row, name)?;
    raw.parse::<T>()
        .map_err(|e| RepoError::Backend(format!("bad value in {name}: {e}")))
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn user_from_row(row: &PgRow) -> RepoResult<User> {
    let managers: Vec<Uuid> = column(row, "managers")?;
    Ok(User {
        id: UserId::from_uuid(column(row, "id")?),
        email: column(row, "email")?,
        password_hash: column(row, "password_hash")?,
        first_name: column(row, "first_name")?,
        last_name: column(row, "last_name")?,
        role: parsed(row, "role")?,
        is_active: column(row, "is_active")?,
        is_banned: column(row, "is_banned")?,
        managers: managers.into_iter().map(UserId::from_uuid).collect(),
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn application_from_row(row: &PgRow) -> RepoResult<Application> {
    let status: Option<String> = column(row, "status")?;
    let status = status
        .map(|s| s.parse::<ApplicationStatus>())
        .transpose()
        .map_err(|e| RepoError::Backend(format!("bad value in status: {e}")))?;
    let manager: Option<Uuid> = column(row, "manager_id")?;
    let comment_ids: Vec<Uuid> = column(row, "comment_ids")?;

    Ok(Application {
        id: ApplicationId::from_uuid(column(row, "id")?),
        name: column(row, "name")?,
        surname: column(row, "surname")?,
        email: column(row, "email")?,
        phone: column(row, "phone")?,
        age: column(row, "age")?,
        course: parsed(row, "course")?,
        course_type: parsed(row, "course_type")?,
        course_format: parsed(row, "course_format")?,
        status,
        sum: column(row, "sum")?,
        already_paid: column(row, "already_paid")?,
        group: column(row, "group")?,
        manager: manager.map(UserId::from_uuid),
        utm: column(row, "utm")?,
        msg: column(row, "msg")?,
        comments: comment_ids.into_iter().map(CommentId::from_uuid).collect(),
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn comment_from_row(row: &PgRow) -> RepoResult<Comment> {
    Ok(Comment {
        id: CommentId::from_uuid(column(row, "id")?),
        application_id: ApplicationId::from_uuid(column(row, "application_id")?),
        text: column(row, "text")?,
        author: UserId::from_uuid(column(row, "author_id")?),
        created_at: column(row, "created_at")?,
    })
}

fn pair_from_row(row: &PgRow) -> RepoResult<StoredTokenPair> {
    Ok(StoredTokenPair {
        user_id: UserId::from_uuid(column(row, "user_id")?),
        access_token: column(row, "access_token")?,
        refresh_token: column(row, "refresh_token")?,
        created_at: column(row, "created_at")?,
        expires_at: column(row, "expires_at")?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Writes shared by `modify`
// ─────────────────────────────────────────────────────────────────────────────

async fn write_user(conn: &mut PgConnection, user: &User) -> RepoResult<()> {
    sqlx::query(
        r#"
        UPDATE users SET
            email = $2,
            password_hash = $3,
            first_name = $4,
            last_name = $5,
            role = $6,
            is_active = $7,
            is_banned = $8,
            managers = $9,
            updated_at = $10
        WHERE id = $1
        "#,
    )
    .bind(*user.id.as_uuid())
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.role.as_str())
    .bind(user.is_active)
    .bind(user.is_banned)
    .bind(uuids(&user.managers))
    .bind(user.updated_at)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("update_user", e))?;
    Ok(())
}

async fn write_application(conn: &mut PgConnection, application: &Application) -> RepoResult<()> {
    sqlx::query(
        r#"
        UPDATE applications SET
            name = $2,
            surname = $3,
            email = $4,
            phone = $5,
            age = $6,
            course = $7,
            course_type = $8,
            course_format = $9,
            status = $10,
            sum = $11,
            already_paid = $12,
            "group" = $13,
            manager_id = $14,
            utm = $15,
            msg = $16,
            comment_ids = $17,
            updated_at = $18
        WHERE id = $1
        "#,
    )
    .bind(*application.id.as_uuid())
    .bind(&application.name)
    .bind(&application.surname)
    .bind(&application.email)
    .bind(&application.phone)
    .bind(application.age)
    .bind(application.course.as_str())
    .bind(application.course_type.as_str())
    .bind(application.course_format.as_str())
    .bind(application.status.map(|s| s.as_str()))
    .bind(application.sum)
    .bind(application.already_paid)
    .bind(&application.group)
    .bind(application.manager.map(|m| *m.as_uuid()))
    .bind(&application.utm)
    .bind(&application.msg)
    .bind(uuids(&application.comments))
    .bind(application.updated_at)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("update_application", e))?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Query building
// ─────────────────────────────────────────────────────────────────────────────

/// `%needle%` with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ApplicationFilter) {
    qb.push(" WHERE TRUE");

    for (col, needle) in [
        ("name", &filter.name),
        ("surname", &filter.surname),
        ("email", &filter.email),
        ("phone", &filter.phone),
    ] {
        if let Some(needle) = needle {
            qb.push(format_args!(" AND {col} ILIKE "));
            qb.push_bind(like_pattern(needle));
        }
    }

    if let Some(age) = filter.age {
        qb.push(" AND age = ").push_bind(age);
    }
    if let Some(course) = filter.course {
        qb.push(" AND course = ").push_bind(course.as_str());
    }
    if let Some(course_type) = filter.course_type {
        qb.push(" AND course_type = ").push_bind(course_type.as_str());
    }
    if let Some(course_format) = filter.course_format {
        qb.push(" AND course_format = ").push_bind(course_format.as_str());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(group) = &filter.group {
        qb.push(r#" AND "group" = "#).push_bind(group.clone());
    }
    if let Some(managers) = &filter.managers {
        qb.push(" AND manager_id = ANY(").push_bind(uuids(managers)).push(")");
    }
    if let Some(from) = filter.created_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(before) = filter.created_before {
        qb.push(" AND created_at < ").push_bind(before);
    }
}

fn sort_expression(field: SortField) -> &'static str {
    match field {
        SortField::Name => "LOWER(name)",
        SortField::Surname => "LOWER(surname)",
        SortField::Email => "email",
        SortField::Phone => "phone",
        SortField::Age => "age",
        SortField::Course => "course",
        SortField::CourseType => "course_type",
        SortField::CourseFormat => "course_format",
        SortField::Status => "status",
        SortField::Group => r#""group""#,
        SortField::Sum => "sum",
        SortField::AlreadyPaid => "already_paid",
        SortField::Manager => "manager_id",
        SortField::CreatedAt => "created_at",
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, sort: SortField, order: SortOrder) {
    // Missing values sort before present ones, as `Option` does.
    let (dir, nulls) = match order {
        SortOrder::Asc => ("ASC", "NULLS FIRST"),
        SortOrder::Desc => ("DESC", "NULLS LAST"),
    };
    qb.push(format_args!(
        " ORDER BY {} {dir} {nulls}, id {dir}",
        sort_expression(sort)
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl UserRepository for PostgresRepository {
    #[instrument(skip(self), err)]
    async fn get(&self, id: UserId) -> RepoResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn get_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user_by_email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_many(&self, ids: &[UserId]) -> RepoResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"))
            .bind(uuids(ids))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_many_users", e))?;
        rows.iter().map(user_from_row).collect()
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn insert(&self, user: &User) -> RepoResult<()> {
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(*user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.is_banned)
        .bind(uuids(&user.managers))
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(())
    }

    /// Row-locks the user for the duration of the mutation.
    #[instrument(skip(self, mutation), err)]
    async fn modify(&self, id: UserId, mutation: Mutation<User>) -> RepoResult<Option<User>> {
        let mut tx = self.begin("modify_user").await?;
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"))
            .bind(*id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_user", e))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut user = user_from_row(&row)?;
        mutation(&mut user)?;
        write_user(&mut tx, &user).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("modify_user", e))?;
        Ok(Some(user))
    }

    async fn list_by_ids(&self, ids: &[UserId], page: PageRequest) -> RepoResult<(Vec<User>, u64)> {
        let ids = uuids(ids);
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_users", e))?;

        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1) ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(&ids)
        .bind(i64::from(page.page_size()))
        .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_users", e))?;

        let users = rows.iter().map(user_from_row).collect::<RepoResult<Vec<_>>>()?;
        Ok((users, total.max(0) as u64))
    }

    async fn find_ids_by_first_name(&self, needle: &str) -> RepoResult<Vec<UserId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE first_name ILIKE $1")
            .bind(like_pattern(needle))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_users_by_first_name", e))?;
        Ok(ids.into_iter().map(UserId::from_uuid).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Applications
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl ApplicationRepository for PostgresRepository {
    #[instrument(skip(self, application), fields(application_id = %application.id), err)]
    async fn insert(&self, application: &Application) -> RepoResult<()> {
        sqlx::query(&format!(
            "INSERT INTO applications ({APPLICATION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)"
        ))
        .bind(*application.id.as_uuid())
        .bind(&application.name)
        .bind(&application.surname)
        .bind(&application.email)
        .bind(&application.phone)
        .bind(application.age)
        .bind(application.course.as_str())
        .bind(application.course_type.as_str())
        .bind(application.course_format.as_str())
        .bind(application.status.map(|s| s.as_str()))
        .bind(application.sum)
        .bind(application.already_paid)
        .bind(&application.group)
        .bind(application.manager.map(|m| *m.as_uuid()))
        .bind(&application.utm)
        .bind(&application.msg)
        .bind(uuids(&application.comments))
        .bind(application.created_at)
        .bind(application.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_application", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get(&self, id: ApplicationId) -> RepoResult<Option<Application>> {
        let row = sqlx::query(&format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1"))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_application", e))?;
        row.as_ref().map(application_from_row).transpose()
    }

    /// Row-locks the application for the duration of the mutation.
    #[instrument(skip(self, mutation), err)]
    async fn modify(
        &self,
        id: ApplicationId,
        mutation: Mutation<Application>,
    ) -> RepoResult<Option<Application>> {
        let mut tx = self.begin("modify_application").await?;
        let row = sqlx::query(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1 FOR UPDATE"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_application", e))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut application = application_from_row(&row)?;
        mutation(&mut application)?;
        write_application(&mut tx, &application).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("modify_application", e))?;
        Ok(Some(application))
    }

    #[instrument(skip(self, query), err)]
    async fn list(&self, query: &ApplicationQuery) -> RepoResult<(Vec<Application>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM applications");
        push_filter(&mut count, &query.filter);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_applications", e))?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {APPLICATION_COLUMNS} FROM applications"));
        push_filter(&mut select, &query.filter);
        push_order(&mut select, query.sort, query.order);
        select
            .push(" LIMIT ")
            .push_bind(i64::from(query.page.page_size()))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.page.offset()).unwrap_or(i64::MAX));

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_applications", e))?;

        let apps = rows.iter().map(application_from_row).collect::<RepoResult<Vec<_>>>()?;
        Ok((apps, total.max(0) as u64))
    }

    async fn statistics(&self) -> RepoResult<StatusStatistics> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM applications GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("application_statistics", e))?;

        let mut stats = StatusStatistics::default();
        for row in &rows {
            let status: Option<String> = column(row, "status")?;
            let count: i64 = column(row, "count")?;
            // Unknown legacy spellings still count toward the total.
            let status = status.and_then(|s| s.parse::<ApplicationStatus>().ok());
            stats.record(status, count.max(0) as u64);
        }
        Ok(stats)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Comments
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl CommentRepository for PostgresRepository {
    async fn insert(&self, comment: &Comment) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO comments (id, application_id, text, author_id, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(*comment.id.as_uuid())
        .bind(*comment.application_id.as_uuid())
        .bind(&comment.text)
        .bind(*comment.author.as_uuid())
        .bind(comment.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_comment", e))?;
        Ok(())
    }

    async fn get_many(&self, ids: &[CommentId]) -> RepoResult<Vec<Comment>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, application_id, text, author_id, created_at FROM comments WHERE id = ANY($1)",
        )
        .bind(uuids(ids))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_comments", e))?;

        let mut comments = rows.iter().map(comment_from_row).collect::<RepoResult<Vec<_>>>()?;
        comments.sort_by_key(|c| ids.iter().position(|id| *id == c.id));
        Ok(comments)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tokens
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl TokenRepository for PostgresRepository {
    async fn save_pair(&self, pair: StoredTokenPair) -> RepoResult<()> {
        self.prune_expired(pair.created_at).await?;
        sqlx::query(&format!("INSERT INTO token_pairs ({PAIR_COLUMNS}) VALUES ($1, $2, $3, $4, $5)"))
            .bind(&pair.access_token)
            .bind(&pair.refresh_token)
            .bind(*pair.user_id.as_uuid())
            .bind(pair.created_at)
            .bind(pair.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("save_token_pair", e))?;
        Ok(())
    }

    async fn find_by_access(&self, access_token: &str) -> RepoResult<Option<StoredTokenPair>> {
        let row = sqlx::query(&format!("SELECT {PAIR_COLUMNS} FROM token_pairs WHERE access_token = $1"))
            .bind(access_token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_token_by_access", e))?;
        row.as_ref().map(pair_from_row).transpose()
    }

    async fn find_by_refresh(&self, refresh_token: &str) -> RepoResult<Option<StoredTokenPair>> {
        let row = sqlx::query(&format!("SELECT {PAIR_COLUMNS} FROM token_pairs WHERE refresh_token = $1"))
            .bind(refresh_token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_token_by_refresh", e))?;
        row.as_ref().map(pair_from_row).transpose()
    }

    async fn delete_pair(&self, access_token: &str) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM token_pairs WHERE access_token = $1")
            .bind(access_token)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_token_pair", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn delete_all_for_user(&self, user_id: UserId) -> RepoResult<u64> {
        let pairs = sqlx::query("DELETE FROM token_pairs WHERE user_id = $1")
            .bind(*user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_user_pairs", e))?;
        let actions = sqlx::query("DELETE FROM action_tokens WHERE user_id = $1")
            .bind(*user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_user_actions", e))?;
        Ok(pairs.rows_affected() + actions.rows_affected())
    }

    async fn save_action(&self, token: StoredActionToken) -> RepoResult<()> {
        self.prune_expired(token.created_at).await?;
        sqlx::query(
            "INSERT INTO action_tokens (kind, token, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(token.kind.as_str())
        .bind(&token.token)
        .bind(*token.user_id.as_uuid())
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_action_token", e))?;
        Ok(())
    }

    async fn take_action(&self, kind: TokenKind, token: &str) -> RepoResult<Option<UserId>> {
        let owner: Option<Uuid> =
            sqlx::query_scalar("DELETE FROM action_tokens WHERE kind = $1 AND token = $2 RETURNING user_id")
                .bind(kind.as_str())
                .bind(token)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("take_action_token", e))?;
        Ok(owner.map(UserId::from_uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_tables_carry_an_expiry() {
        for table in ["token_pairs", "action_tokens"] {
            assert!(SCHEMA.contains(&format!("{table}_expires_at_idx ON {table} (expires_at)")));
        }
        assert!(PAIR_COLUMNS.ends_with("expires_at"));
    }

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("ta"), "%ta%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn filter_sql_binds_only_present_fields() {
        let query = crm_applications::ApplicationQueryParams {
            name: Some("Ta".into()),
            status: Some("New".into()),
            ..Default::default()
        }
        .parse()
        .unwrap();

        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM applications");
        push_filter(&mut qb, &query.filter);
        push_order(&mut qb, query.sort, query.order);
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM applications WHERE TRUE AND name ILIKE $1 AND status = $2 ORDER BY created_at DESC NULLS LAST, id DESC"
        );
    }
}
