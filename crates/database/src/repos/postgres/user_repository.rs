//! PostgreSQL user store. Search uses the generated `search_vector`
//! column, tag filters the `&&` array overlap operator.

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use sqlx::postgres::PgArguments;
use sqlx::query::{Query, QueryAs};
use sqlx::{PgPool, Postgres};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use template_sqlc_users::repositories::{validate_page, validate_search, validate_tag_search};
use template_sqlc_users::{
    Clock, DomainError, DomainResult, Email, PasswordHash, User, UserId, UserRepository, UserRole,
    UserStats, UserStatus, Username,
};
use tracing::debug;
use uuid::Uuid;

use super::rows::{UserRow, USER_COLUMNS};
use crate::converters::postgres::{
    PostgresBoolConverter, PostgresTagsConverter, PostgresTimeConverter, PostgresUuidConverter,
};
use crate::converters::{
    Converter, EmailConverter, FirstNameConverter, LastNameConverter, MetadataConverter,
    PasswordHashConverter, RoleConverter, StatusConverter, UsernameConverter,
};
use crate::errors::bounded;
use crate::repos::{prefix_tsquery, trimmed_tags, AdapterOptions, UserStatsRow, USER};

pub struct PostgresUserRepository {
    pool: PgPool,
    query_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self::with_options(pool, AdapterOptions::default())
    }

    pub fn with_options(pool: PgPool, options: AdapterOptions) -> Self {
        Self {
            pool,
            query_timeout: options.query_timeout,
            clock: options.clock,
        }
    }

    async fn fetch_one<'q>(&self, query: QueryAs<'q, Postgres, UserRow, PgArguments>) -> DomainResult<User> {
        let row = bounded(self.query_timeout, USER, query.fetch_one(&self.pool)).await?;
        Ok(row.into_user()?)
    }

    async fn fetch_users<'q>(
        &self,
        query: QueryAs<'q, Postgres, UserRow, PgArguments>,
    ) -> DomainResult<Vec<User>> {
        let rows = bounded(self.query_timeout, USER, query.fetch_all(&self.pool)).await?;
        rows.into_iter()
            .map(|row| row.into_user().map_err(DomainError::from))
            .collect()
    }

    async fn update_one<'q>(&self, query: Query<'q, Postgres, PgArguments>) -> DomainResult<()> {
        let result = bounded(self.query_timeout, USER, query.execute(&self.pool)).await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::user_not_found());
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: &User) -> DomainResult<User> {
        let (id,): (i64,) = bounded(
            self.query_timeout,
            USER,
            sqlx::query_as(
                "INSERT INTO users (uuid, email, username, password_hash, first_name, last_name, \
                 status, role, is_verified, metadata, tags, created_at, updated_at, last_login_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) RETURNING id",
            )
            .bind(PostgresUuidConverter.to_db(&user.uuid()))
            .bind(EmailConverter.to_db(user.email()))
            .bind(UsernameConverter.to_db(user.username()))
            .bind(PasswordHashConverter.to_db(user.password_hash()))
            .bind(FirstNameConverter.to_db(user.first_name()))
            .bind(LastNameConverter.to_db(user.last_name()))
            .bind(StatusConverter.to_db(&user.status()))
            .bind(RoleConverter.to_db(&user.role()))
            .bind(PostgresBoolConverter.to_db(&user.is_verified()))
            .bind(MetadataConverter.to_db(user.metadata()))
            .bind(PostgresTagsConverter.to_db(&user.tags().to_vec()))
            .bind(user.created_at())
            .bind(user.updated_at())
            .bind(PostgresTimeConverter.to_db(&user.last_login_at()))
            .fetch_one(&self.pool),
        )
        .await?;

        let id = UserId::new(id);
        debug!(user_id = %id, "user row inserted");
        Ok(user.clone().with_id(id))
    }

    async fn get_by_id(&self, id: UserId) -> DomainResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        self.fetch_one(sqlx::query_as(&sql).bind(id.get())).await
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> DomainResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE uuid = $1");
        self.fetch_one(sqlx::query_as(&sql).bind(uuid)).await
    }

    async fn get_by_email(&self, email: &Email) -> DomainResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        self.fetch_one(sqlx::query_as(&sql).bind(EmailConverter.to_db(email)))
            .await
    }

    async fn get_by_username(&self, username: &Username) -> DomainResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(username) = lower($1)");
        self.fetch_one(sqlx::query_as(&sql).bind(UsernameConverter.to_db(username)))
            .await
    }

    async fn update(&self, user: &User) -> DomainResult<()> {
        self.update_one(
            sqlx::query(
                "UPDATE users SET email = $1, username = $2, password_hash = $3, first_name = $4, \
                 last_name = $5, status = $6, role = $7, is_verified = $8, metadata = $9, \
                 tags = $10, updated_at = $11, last_login_at = $12 WHERE id = $13",
            )
            .bind(EmailConverter.to_db(user.email()))
            .bind(UsernameConverter.to_db(user.username()))
            .bind(PasswordHashConverter.to_db(user.password_hash()))
            .bind(FirstNameConverter.to_db(user.first_name()))
            .bind(LastNameConverter.to_db(user.last_name()))
            .bind(StatusConverter.to_db(&user.status()))
            .bind(RoleConverter.to_db(&user.role()))
            .bind(PostgresBoolConverter.to_db(&user.is_verified()))
            .bind(MetadataConverter.to_db(user.metadata()))
            .bind(PostgresTagsConverter.to_db(&user.tags().to_vec()))
            .bind(user.updated_at())
            .bind(PostgresTimeConverter.to_db(&user.last_login_at()))
            .bind(user.id().get()),
        )
        .await
    }

    async fn delete(&self, id: UserId) -> DomainResult<()> {
        let result = bounded(
            self.query_timeout,
            USER,
            sqlx::query("UPDATE users SET status = $1, updated_at = $2 WHERE id = $3 AND status <> $1")
                .bind(StatusConverter.to_db(&UserStatus::Inactive))
                .bind(self.clock.now())
                .bind(id.get())
                .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            self.get_by_id(id).await?;
        }
        Ok(())
    }

    async fn list(&self, status: UserStatus, limit: i64, offset: i64) -> DomainResult<Vec<User>> {
        validate_page(limit, offset)?;
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE status = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        self.fetch_users(
            sqlx::query_as(&sql)
                .bind(StatusConverter.to_db(&status))
                .bind(limit)
                .bind(offset),
        )
        .await
    }

    async fn search(&self, query: &str, status: UserStatus, limit: i64) -> DomainResult<Vec<User>> {
        let query = validate_search(query, limit)?;
        let Some(tsquery) = prefix_tsquery(query) else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE search_vector @@ to_tsquery('simple', $1) AND status = $2 \
             ORDER BY ts_rank(search_vector, to_tsquery('simple', $1)) DESC, id DESC LIMIT $3"
        );
        self.fetch_users(
            sqlx::query_as(&sql)
                .bind(tsquery)
                .bind(StatusConverter.to_db(&status))
                .bind(limit),
        )
        .await
    }

    async fn search_by_tags(
        &self,
        tags: &[String],
        status: UserStatus,
        limit: i64,
        offset: i64,
    ) -> DomainResult<Vec<User>> {
        validate_tag_search(tags, limit, offset)?;
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE status = $1 AND tags && $2::text[] \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
        );
        self.fetch_users(
            sqlx::query_as(&sql)
                .bind(StatusConverter.to_db(&status))
                .bind(trimmed_tags(tags))
                .bind(limit)
                .bind(offset),
        )
        .await
    }

    async fn count_by_status(&self) -> DomainResult<BTreeMap<UserStatus, i64>> {
        let rows: Vec<(String, i64)> = bounded(
            self.query_timeout,
            USER,
            sqlx::query_as("SELECT status, COUNT(*) FROM users GROUP BY status")
                .fetch_all(&self.pool),
        )
        .await?;

        rows.into_iter()
            .map(|(status, count)| {
                StatusConverter
                    .from_db(status)
                    .map(|status| (status, count))
                    .map_err(DomainError::from)
            })
            .collect()
    }

    async fn get_stats(&self) -> DomainResult<UserStats> {
        let now = self.clock.now();
        let row: UserStatsRow = bounded(
            self.query_timeout,
            USER,
            sqlx::query_as(
                "SELECT COUNT(*) AS total_users, \
                 COUNT(*) FILTER (WHERE status = 'active') AS active_users, \
                 COUNT(*) FILTER (WHERE status = 'inactive') AS inactive_users, \
                 COUNT(*) FILTER (WHERE status = 'suspended') AS suspended_users, \
                 COUNT(*) FILTER (WHERE is_verified) AS verified_users, \
                 COUNT(*) FILTER (WHERE last_login_at IS NOT NULL) AS users_with_logins, \
                 COUNT(*) FILTER (WHERE created_at >= $1) AS new_users_30d, \
                 COUNT(*) FILTER (WHERE created_at >= $2) AS new_users_7d \
                 FROM users",
            )
            .bind(now - ChronoDuration::days(30))
            .bind(now - ChronoDuration::days(7))
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(row.into())
    }

    async fn verify_credentials(&self, email: &Email, password: &PasswordHash) -> DomainResult<User> {
        let user = match self.get_by_email(email).await {
            Ok(user) => user,
            Err(error) if error.is_not_found() => return Err(DomainError::invalid_credentials()),
            Err(error) => return Err(error),
        };
        if !user.password_hash().matches(password) {
            return Err(DomainError::invalid_credentials());
        }
        Ok(user)
    }

    async fn update_password(&self, id: UserId, password: &PasswordHash) -> DomainResult<()> {
        self.update_one(
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
                .bind(PasswordHashConverter.to_db(password))
                .bind(self.clock.now())
                .bind(id.get()),
        )
        .await
    }

    async fn mark_verified(&self, id: UserId) -> DomainResult<()> {
        self.update_one(
            sqlx::query("UPDATE users SET is_verified = TRUE, updated_at = $1 WHERE id = $2")
                .bind(self.clock.now())
                .bind(id.get()),
        )
        .await
    }

    async fn change_status(&self, id: UserId, status: UserStatus) -> DomainResult<()> {
        self.update_one(
            sqlx::query("UPDATE users SET status = $1, updated_at = $2 WHERE id = $3")
                .bind(StatusConverter.to_db(&status))
                .bind(self.clock.now())
                .bind(id.get()),
        )
        .await
    }

    async fn change_role(&self, id: UserId, role: UserRole) -> DomainResult<()> {
        self.update_one(
            sqlx::query("UPDATE users SET role = $1, updated_at = $2 WHERE id = $3")
                .bind(RoleConverter.to_db(&role))
                .bind(self.clock.now())
                .bind(id.get()),
        )
        .await
    }
}
