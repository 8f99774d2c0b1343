use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use template_sqlc_users::{
    Clock, DomainError, DomainResult, SessionId, SessionRepository, SessionStats, SessionToken,
    UserId, UserSession,
};
use tracing::debug;

use super::rows::{SessionRow, SESSION_COLUMNS};
use crate::converters::sqlite::{SqliteBoolConverter, SqliteTimestampConverter, SqliteUuidConverter};
use crate::converters::{Converter, DeviceInfoConverter, IpAddressConverter};
use crate::errors::bounded;
use crate::repos::{AdapterOptions, SessionStatsRow, SESSION};

pub struct SqliteSessionRepository {
    pool: SqlitePool,
    query_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl SqliteSessionRepository {
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

    fn now(&self) -> String {
        SqliteTimestampConverter.to_db(&self.clock.now())
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, session: &UserSession) -> DomainResult<UserSession> {
        let result = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query(
                "INSERT INTO user_sessions (user_id, token, device_info, ip_address, user_agent, \
                 created_at, expires_at, is_active) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(session.user_id().get())
            .bind(SqliteUuidConverter.to_db(&session.token().as_uuid()))
            .bind(DeviceInfoConverter.to_db(session.device_info()).to_string())
            .bind(IpAddressConverter.to_db(&session.ip_address()))
            .bind(session.user_agent().to_string())
            .bind(SqliteTimestampConverter.to_db(&session.created_at()))
            .bind(SqliteTimestampConverter.to_db(&session.expires_at()))
            .bind(SqliteBoolConverter.to_db(&session.is_active()))
            .execute(&self.pool),
        )
        .await?;

        let id = SessionId::new(result.last_insert_rowid());
        debug!(session_id = %id, user_id = %session.user_id(), "session row inserted");
        Ok(session.clone().with_id(id))
    }

    async fn get_by_token(&self, token: &SessionToken) -> DomainResult<UserSession> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM user_sessions WHERE token = ?");
        let row: Option<SessionRow> = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query_as(&sql)
                .bind(SqliteUuidConverter.to_db(&token.as_uuid()))
                .fetch_optional(&self.pool),
        )
        .await?;

        let session = row
            .ok_or_else(DomainError::session_not_found)?
            .into_session()?;
        if session.is_expired_at(self.clock.now()) {
            return Err(DomainError::session_past_expiry());
        }
        if !session.is_active() {
            return Err(DomainError::session_deactivated());
        }
        Ok(session)
    }

    async fn get_by_user_id(&self, user_id: UserId, active_only: bool) -> DomainResult<Vec<UserSession>> {
        let live_filter = if active_only {
            "AND is_active = 1 AND expires_at > ?"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM user_sessions WHERE user_id = ? {live_filter} \
             ORDER BY created_at DESC, id DESC"
        );
        let mut query = sqlx::query_as::<_, SessionRow>(&sql).bind(user_id.get());
        if active_only {
            query = query.bind(self.now());
        }
        let rows = bounded(self.query_timeout, SESSION, query.fetch_all(&self.pool)).await?;

        rows.into_iter()
            .map(|row| row.into_session().map_err(DomainError::from))
            .collect()
    }

    async fn update(&self, session: &UserSession) -> DomainResult<()> {
        let result = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query(
                "UPDATE user_sessions SET device_info = ?, ip_address = ?, user_agent = ?, \
                 expires_at = ?, is_active = ? WHERE id = ?",
            )
            .bind(DeviceInfoConverter.to_db(session.device_info()).to_string())
            .bind(IpAddressConverter.to_db(&session.ip_address()))
            .bind(session.user_agent().to_string())
            .bind(SqliteTimestampConverter.to_db(&session.expires_at()))
            .bind(SqliteBoolConverter.to_db(&session.is_active()))
            .bind(session.id().get())
            .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::session_not_found());
        }
        Ok(())
    }

    async fn delete(&self, id: SessionId) -> DomainResult<()> {
        let result = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query("DELETE FROM user_sessions WHERE id = ?")
                .bind(id.get())
                .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::session_not_found());
        }
        Ok(())
    }

    async fn deactivate_by_token(&self, token: &SessionToken) -> DomainResult<()> {
        bounded(
            self.query_timeout,
            SESSION,
            sqlx::query("UPDATE user_sessions SET is_active = 0 WHERE token = ?")
                .bind(SqliteUuidConverter.to_db(&token.as_uuid()))
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn deactivate_by_user_id(&self, user_id: UserId) -> DomainResult<u64> {
        let result = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query("UPDATE user_sessions SET is_active = 0 WHERE user_id = ? AND is_active = 1")
                .bind(user_id.get())
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }

    async fn cleanup_expired(&self) -> DomainResult<u64> {
        let result = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query("UPDATE user_sessions SET is_active = 0 WHERE is_active = 1 AND expires_at <= ?")
                .bind(self.now())
                .execute(&self.pool),
        )
        .await?;

        let swept = result.rows_affected();
        if swept > 0 {
            debug!(swept, "expired sessions deactivated");
        }
        Ok(swept)
    }

    async fn get_active_sessions(&self, user_id: UserId) -> DomainResult<i64> {
        let (count,): (i64,) = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query_as(
                "SELECT COUNT(*) FROM user_sessions WHERE user_id = ? AND is_active = 1 AND expires_at > ?",
            )
            .bind(user_id.get())
            .bind(self.now())
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(count)
    }

    async fn get_session_stats(&self) -> DomainResult<SessionStats> {
        let now = self.clock.now();
        let row: SessionStatsRow = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query_as(
                "SELECT COUNT(*) AS total_sessions, \
                 COALESCE(SUM(CASE WHEN is_active = 1 AND expires_at > ?1 THEN 1 ELSE 0 END), 0) AS active_sessions, \
                 COALESCE(SUM(CASE WHEN expires_at <= ?1 THEN 1 ELSE 0 END), 0) AS expired_sessions, \
                 COALESCE(SUM(CASE WHEN created_at >= ?2 THEN 1 ELSE 0 END), 0) AS sessions_24h, \
                 COALESCE(SUM(CASE WHEN created_at >= ?3 THEN 1 ELSE 0 END), 0) AS sessions_7d, \
                 COALESCE(SUM(CASE WHEN created_at >= ?4 THEN 1 ELSE 0 END), 0) AS sessions_30d \
                 FROM user_sessions",
            )
            .bind(SqliteTimestampConverter.to_db(&now))
            .bind(SqliteTimestampConverter.to_db(&(now - ChronoDuration::hours(24))))
            .bind(SqliteTimestampConverter.to_db(&(now - ChronoDuration::days(7))))
            .bind(SqliteTimestampConverter.to_db(&(now - ChronoDuration::days(30))))
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(row.into())
    }
}
