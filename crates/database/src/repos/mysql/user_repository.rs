//! MySQL user store. Search runs on the `ft_users_search` FULLTEXT index
//! in boolean mode, tag filters on `JSON_OVERLAPS`.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::mysql::MySqlArguments;
use sqlx::query::{Query, QueryAs};
use sqlx::{MySql, MySqlPool};
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
use crate::converters::mysql::{MySqlBoolConverter, MySqlTimeConverter, MySqlUuidConverter};
use crate::converters::{
    Converter, EmailConverter, FirstNameConverter, LastNameConverter, MetadataConverter,
    PasswordHashConverter, RoleConverter, StatusConverter, TagsConverter, UsernameConverter,
};
use crate::errors::bounded;
use crate::repos::{boolean_mode_query, trimmed_tags, AdapterOptions, UserStatsRow, USER};

pub(super) fn stamp(at: DateTime<Utc>) -> Option<NaiveDateTime> {
    MySqlTimeConverter.to_db(&Some(at))
}

pub(super) fn inserted_id(raw: u64) -> DomainResult<i64> {
    i64::try_from(raw).map_err(|_| DomainError::internal("inserted id out of range"))
}

pub struct MySqlUserRepository {
    pool: MySqlPool,
    query_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl MySqlUserRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self::with_options(pool, AdapterOptions::default())
    }

    pub fn with_options(pool: MySqlPool, options: AdapterOptions) -> Self {
        Self {
            pool,
            query_timeout: options.query_timeout,
            clock: options.clock,
        }
    }

    async fn fetch_one<'q>(&self, query: QueryAs<'q, MySql, UserRow, MySqlArguments>) -> DomainResult<User> {
        let row = bounded(self.query_timeout, USER, query.fetch_one(&self.pool)).await?;
        Ok(row.into_user()?)
    }

    async fn fetch_users<'q>(
        &self,
        query: QueryAs<'q, MySql, UserRow, MySqlArguments>,
    ) -> DomainResult<Vec<User>> {
        let rows = bounded(self.query_timeout, USER, query.fetch_all(&self.pool)).await?;
        rows.into_iter()
            .map(|row| row.into_user().map_err(DomainError::from))
            .collect()
    }

    /// Zero affected rows only means "missing" once the row is confirmed absent.
    async fn update_one<'q>(&self, id: UserId, query: Query<'q, MySql, MySqlArguments>) -> DomainResult<()> {
        let result = bounded(self.query_timeout, USER, query.execute(&self.pool)).await?;
        if result.rows_affected() == 0 {
            self.get_by_id(id).await?;
        }
        Ok(())
    }

    fn now(&self) -> Option<NaiveDateTime> {
        stamp(self.clock.now())
    }
}

#[async_trait]
impl UserRepository for MySqlUserRepository {
    async fn create(&self, user: &User) -> DomainResult<User> {
        let result = bounded(
            self.query_timeout,
            USER,
            sqlx::query(
                "INSERT INTO users (uuid, email, username, password_hash, first_name, last_name, \
                 status, role, is_verified, metadata, tags, created_at, updated_at, last_login_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(MySqlUuidConverter.to_db(&user.uuid()))
            .bind(EmailConverter.to_db(user.email()))
            .bind(UsernameConverter.to_db(user.username()))
            .bind(PasswordHashConverter.to_db(user.password_hash()))
            .bind(FirstNameConverter.to_db(user.first_name()))
            .bind(LastNameConverter.to_db(user.last_name()))
            .bind(StatusConverter.to_db(&user.status()))
            .bind(RoleConverter.to_db(&user.role()))
            .bind(MySqlBoolConverter.to_db(&user.is_verified()))
            .bind(MetadataConverter.to_db(user.metadata()))
            .bind(TagsConverter.to_db(&user.tags().to_vec()))
            .bind(stamp(user.created_at()))
            .bind(stamp(user.updated_at()))
            .bind(MySqlTimeConverter.to_db(&user.last_login_at()))
            .execute(&self.pool),
        )
        .await?;

        let id = UserId::new(inserted_id(result.last_insert_id())?);
        debug!(user_id = %id, "user row inserted");
        Ok(user.clone().with_id(id))
    }

    async fn get_by_id(&self, id: UserId) -> DomainResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        self.fetch_one(sqlx::query_as(&sql).bind(id.get())).await
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> DomainResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE uuid = ?");
        self.fetch_one(sqlx::query_as(&sql).bind(MySqlUuidConverter.to_db(&uuid)))
            .await
    }

    async fn get_by_email(&self, email: &Email) -> DomainResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        self.fetch_one(sqlx::query_as(&sql).bind(EmailConverter.to_db(email)))
            .await
    }

    /// The column collation is case-insensitive.
    async fn get_by_username(&self, username: &Username) -> DomainResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?");
        self.fetch_one(sqlx::query_as(&sql).bind(UsernameConverter.to_db(username)))
            .await
    }

    async fn update(&self, user: &User) -> DomainResult<()> {
        self.update_one(
            user.id(),
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
            .bind(MySqlBoolConverter.to_db(&user.is_verified()))
            .bind(MetadataConverter.to_db(user.metadata()))
            .bind(TagsConverter.to_db(&user.tags().to_vec()))
            .bind(stamp(user.updated_at()))
            .bind(MySqlTimeConverter.to_db(&user.last_login_at()))
            .bind(user.id().get()),
        )
        .await
    }

    async fn delete(&self, id: UserId) -> DomainResult<()> {
        let inactive = StatusConverter.to_db(&UserStatus::Inactive);
        self.update_one(
            id,
            sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ? AND status <> ?")
                .bind(inactive.clone())
                .bind(self.now())
                .bind(id.get())
                .bind(inactive),
        )
        .await
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
        let Some(terms) = boolean_mode_query(query) else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE MATCH (email, username, first_name, last_name) AGAINST (? IN BOOLEAN MODE) \
             AND status = ? \
             ORDER BY MATCH (email, username, first_name, last_name) AGAINST (? IN BOOLEAN MODE) DESC, \
             id DESC LIMIT ?"
        );
        self.fetch_users(
            sqlx::query_as(&sql)
                .bind(terms.clone())
                .bind(StatusConverter.to_db(&status))
                .bind(terms)
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
            "SELECT {USER_COLUMNS} FROM users \
             WHERE status = ? AND JSON_OVERLAPS(tags, CAST(? AS JSON)) \
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
                 CAST(COALESCE(SUM(status = 'active'), 0) AS SIGNED) AS active_users, \
                 CAST(COALESCE(SUM(status = 'inactive'), 0) AS SIGNED) AS inactive_users, \
                 CAST(COALESCE(SUM(status = 'suspended'), 0) AS SIGNED) AS suspended_users, \
                 CAST(COALESCE(SUM(is_verified = 1), 0) AS SIGNED) AS verified_users, \
                 CAST(COALESCE(SUM(last_login_at IS NOT NULL), 0) AS SIGNED) AS users_with_logins, \
                 CAST(COALESCE(SUM(created_at >= ?), 0) AS SIGNED) AS new_users_30d, \
                 CAST(COALESCE(SUM(created_at >= ?), 0) AS SIGNED) AS new_users_7d \
                 FROM users",
            )
            .bind(stamp(now - ChronoDuration::days(30)))
            .bind(stamp(now - ChronoDuration::days(7)))
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
            id,
            sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
                .bind(PasswordHashConverter.to_db(password))
                .bind(self.now())
                .bind(id.get()),
        )
        .await
    }

    async fn mark_verified(&self, id: UserId) -> DomainResult<()> {
        self.update_one(
            id,
            sqlx::query("UPDATE users SET is_verified = 1, updated_at = ? WHERE id = ?")
                .bind(self.now())
                .bind(id.get()),
        )
        .await
    }

    async fn change_status(&self, id: UserId, status: UserStatus) -> DomainResult<()> {
        self.update_one(
            id,
            sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
                .bind(StatusConverter.to_db(&status))
                .bind(self.now())
                .bind(id.get()),
        )
        .await
    }

    async fn change_role(&self, id: UserId, role: UserRole) -> DomainResult<()> {
        self.update_one(
            id,
            sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
                .bind(RoleConverter.to_db(&role))
                .bind(self.now())
                .bind(id.get()),
        )
        .await
    }
}
