//! SQLite user store. Search runs on the `users_fts` FTS5 table, tag
//! filters on `json_each`.

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use serde_json::Value;
use sqlx::query::{Query, QueryAs};
use sqlx::sqlite::SqliteArguments;
use sqlx::{Sqlite, SqlitePool};
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
use crate::converters::sqlite::{
    SqliteBoolConverter, SqliteTimeConverter, SqliteTimestampConverter, SqliteUuidConverter,
};
use crate::converters::{
    Converter, EmailConverter, FirstNameConverter, LastNameConverter, MetadataConverter,
    PasswordHashConverter, RoleConverter, StatusConverter, TagsConverter, UsernameConverter,
};
use crate::errors::bounded;
use crate::repos::{fts5_query, trimmed_tags, AdapterOptions, UserStatsRow, USER};

pub struct SqliteUserRepository {
    pool: SqlitePool,
    query_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_options(pool, AdapterOptions::default())
    }

    pub fn with_options(pool: SqlitePool, options: AdapterOptions) -> Self {
        Self {
            pool,
            query_timeout: options.query_timeout,
            clock: options.clock,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn find_where<T>(&self, clause: &str, value: T) -> DomainResult<User>
    where
        T: for<'q> sqlx::Encode<'q, Sqlite> + sqlx::Type<Sqlite> + Send + 'static,
    {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause}");
        let row = bounded(
            self.query_timeout,
            USER,
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(value)
                .fetch_one(&self.pool),
        )
        .await?;
        Ok(row.into_user()?)
    }

    async fn fetch_users<'q>(
        &self,
        query: QueryAs<'q, Sqlite, UserRow, SqliteArguments<'q>>,
    ) -> DomainResult<Vec<User>> {
        let rows = bounded(self.query_timeout, USER, query.fetch_all(&self.pool)).await?;
        rows.into_iter()
            .map(|row| row.into_user().map_err(DomainError::from))
            .collect()
    }

    /// Run a single-row update and report `NotFound` when no row matched.
    async fn update_one<'q>(&self, query: Query<'q, Sqlite, SqliteArguments<'q>>) -> DomainResult<()> {
        let result = bounded(self.query_timeout, USER, query.execute(&self.pool)).await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::user_not_found());
        }
        Ok(())
    }

    fn now(&self) -> String {
        SqliteTimestampConverter.to_db(&self.clock.now())
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: &User) -> DomainResult<User> {
        let result = bounded(
            self.query_timeout,
            USER,
            sqlx::query(
                "INSERT INTO users (uuid, email, username, password_hash, first_name, last_name, \
                 status, role, is_verified, metadata, tags, created_at, updated_at, last_login_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(SqliteUuidConverter.to_db(&user.uuid()))
            .bind(EmailConverter.to_db(user.email()))
            .bind(UsernameConverter.to_db(user.username()))
            .bind(PasswordHashConverter.to_db(user.password_hash()))
            .bind(FirstNameConverter.to_db(user.first_name()))
            .bind(LastNameConverter.to_db(user.last_name()))
            .bind(StatusConverter.to_db(&user.status()))
            .bind(RoleConverter.to_db(&user.role()))
            .bind(SqliteBoolConverter.to_db(&user.is_verified()))
            .bind(MetadataConverter.to_db(user.metadata()).to_string())
            .bind(TagsConverter.to_db(&user.tags().to_vec()).to_string())
            .bind(SqliteTimestampConverter.to_db(&user.created_at()))
            .bind(SqliteTimestampConverter.to_db(&user.updated_at()))
            .bind(SqliteTimeConverter.to_db(&user.last_login_at()))
            .execute(&self.pool),
        )
        .await?;

        let id = UserId::new(result.last_insert_rowid());
        debug!(user_id = %id, "user row inserted");
        Ok(user.clone().with_id(id))
    }

    async fn get_by_id(&self, id: UserId) -> DomainResult<User> {
        self.find_where("id = ?", id.get()).await
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> DomainResult<User> {
        self.find_where("uuid = ?", SqliteUuidConverter.to_db(&uuid))
            .await
    }

    async fn get_by_email(&self, email: &Email) -> DomainResult<User> {
        self.find_where("email = ?", EmailConverter.to_db(email)).await
    }

    async fn get_by_username(&self, username: &Username) -> DomainResult<User> {
        self.find_where("username = ?", UsernameConverter.to_db(username))
            .await
    }

    async fn update(&self, user: &User) -> DomainResult<()> {
        self.update_one(
            sqlx::query(
                "UPDATE users SET email = ?, username = ?, password_hash = ?, first_name = ?, \
                 last_name = ?, status = ?, role = ?, is_verified = ?, metadata = ?, tags = ?, \
                 updated_at = ?, last_login_at = ? WHERE id = ?",
            )
            .bind(EmailConverter.to_db(user.email()))
            .bind(UsernameConverter.to_db(user.username()))
            .bind(PasswordHashConverter.to_db(user.password_hash()))
            .bind(FirstNameConverter.to_db(user.first_name()))
            .bind(LastNameConverter.to_db(user.last_name()))
            .bind(StatusConverter.to_db(&user.status()))
            .bind(RoleConverter.to_db(&user.role()))
            .bind(SqliteBoolConverter.to_db(&user.is_verified()))
            .bind(MetadataConverter.to_db(user.metadata()).to_string())
            .bind(TagsConverter.to_db(&user.tags().to_vec()).to_string())
            .bind(SqliteTimestampConverter.to_db(&user.updated_at()))
            .bind(SqliteTimeConverter.to_db(&user.last_login_at()))
            .bind(user.id().get()),
        )
        .await
    }

    async fn delete(&self, id: UserId) -> DomainResult<()> {
        let result = bounded(
            self.query_timeout,
            USER,
            sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ? AND status <> ?")
                .bind(StatusConverter.to_db(&UserStatus::Inactive))
                .bind(self.now())
                .bind(id.get())
                .bind(StatusConverter.to_db(&UserStatus::Inactive))
                .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            // Already inactive is fine; a missing row is not.
            self.get_by_id(id).await?;
        }
        Ok(())
    }

    async fn list(&self, status: UserStatus, limit: i64, offset: i64) -> DomainResult<Vec<User>> {
        validate_page(limit, offset)?;
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE status = ? \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
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
        let columns = USER_COLUMNS
            .split(", ")
            .map(|column| format!("u.{}", column.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {columns} FROM users_fts JOIN users u ON u.id = users_fts.rowid \
             WHERE users_fts MATCH ? AND u.status = ? \
             ORDER BY bm25(users_fts), u.id DESC LIMIT ?"
        );
        self.fetch_users(
            sqlx::query_as(&sql)
                .bind(fts5_query(query))
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
            "SELECT {USER_COLUMNS} FROM users WHERE status = ? AND EXISTS ( \
                 SELECT 1 FROM json_each(users.tags) AS stored \
                 WHERE stored.value IN (SELECT value FROM json_each(?))) \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        self.fetch_users(
            sqlx::query_as(&sql)
                .bind(StatusConverter.to_db(&status))
                .bind(Value::from(trimmed_tags(tags)).to_string())
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
                 COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0) AS active_users, \
                 COALESCE(SUM(CASE WHEN status = 'inactive' THEN 1 ELSE 0 END), 0) AS inactive_users, \
                 COALESCE(SUM(CASE WHEN status = 'suspended' THEN 1 ELSE 0 END), 0) AS suspended_users, \
                 COALESCE(SUM(CASE WHEN is_verified = 1 THEN 1 ELSE 0 END), 0) AS verified_users, \
                 COALESCE(SUM(CASE WHEN last_login_at IS NOT NULL THEN 1 ELSE 0 END), 0) AS users_with_logins, \
                 COALESCE(SUM(CASE WHEN created_at >= ? THEN 1 ELSE 0 END), 0) AS new_users_30d, \
                 COALESCE(SUM(CASE WHEN created_at >= ? THEN 1 ELSE 0 END), 0) AS new_users_7d \
                 FROM users",
            )
            .bind(SqliteTimestampConverter.to_db(&(now - ChronoDuration::days(30))))
            .bind(SqliteTimestampConverter.to_db(&(now - ChronoDuration::days(7))))
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
            sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
                .bind(PasswordHashConverter.to_db(password))
                .bind(self.now())
                .bind(id.get()),
        )
        .await
    }

    async fn mark_verified(&self, id: UserId) -> DomainResult<()> {
        self.update_one(
            sqlx::query("UPDATE users SET is_verified = ?, updated_at = ? WHERE id = ?")
                .bind(SqliteBoolConverter.to_db(&true))
                .bind(self.now())
                .bind(id.get()),
        )
        .await
    }

    async fn change_status(&self, id: UserId, status: UserStatus) -> DomainResult<()> {
        self.update_one(
            sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
                .bind(StatusConverter.to_db(&status))
                .bind(self.now())
                .bind(id.get()),
        )
        .await
    }

    async fn change_role(&self, id: UserId, role: UserRole) -> DomainResult<()> {
        self.update_one(
            sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
                .bind(RoleConverter.to_db(&role))
                .bind(self.now())
                .bind(id.get()),
        )
        .await
    }
}
