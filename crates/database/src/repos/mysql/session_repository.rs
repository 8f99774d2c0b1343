use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;
use template_sqlc_users::{
    Clock, DomainError, DomainResult, SessionId, SessionRepository, SessionStats, SessionToken,
    UserId, UserSession,
};
use tracing::debug;

use super::rows::{SessionRow, SESSION_COLUMNS};
use super::user_repository::{inserted_id, stamp};
use crate::converters::mysql::{MySqlBoolConverter, MySqlUuidConverter};
use crate::converters::{Converter, DeviceInfoConverter, IpAddressConverter};
use crate::errors::bounded;
use crate::repos::{AdapterOptions, SessionStatsRow, SESSION};

pub struct MySqlSessionRepository {
    pool: MySqlPool,
    query_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl MySqlSessionRepository {
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

    async fn exists(&self, id: SessionId) -> DomainResult<bool> {
        let row: Option<(i64,)> = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query_as("SELECT id FROM user_sessions WHERE id = ?")
                .bind(id.get())
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl SessionRepository for MySqlSessionRepository {
    async fn create(&self, session: &UserSession) -> DomainResult<UserSession> {
        let result = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query(
                "INSERT INTO user_sessions (user_id, token, device_info, ip_address, user_agent, \
                 created_at, expires_at, is_active) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(session.user_id().get())
            .bind(MySqlUuidConverter.to_db(&session.token().as_uuid()))
            .bind(DeviceInfoConverter.to_db(session.device_info()))
            .bind(IpAddressConverter.to_db(&session.ip_address()))
            .bind(session.user_agent())
            .bind(stamp(session.created_at()))
            .bind(stamp(session.expires_at()))
            .bind(MySqlBoolConverter.to_db(&session.is_active()))
            .execute(&self.pool),
        )
        .await?;

        let id = SessionId::new(inserted_id(result.last_insert_id())?);
        debug!(session_id = %id, user_id = %session.user_id(), "session row inserted");
        Ok(session.clone().with_id(id))
    }

    async fn get_by_token(&self, token: &SessionToken) -> DomainResult<UserSession> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM user_sessions WHERE token = ?");
        let row: Option<SessionRow> = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query_as(&sql)
                .bind(MySqlUuidConverter.to_db(&token.as_uuid()))
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
            query = query.bind(stamp(self.clock.now()));
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
            .bind(DeviceInfoConverter.to_db(session.device_info()))
            .bind(IpAddressConverter.to_db(&session.ip_address()))
            .bind(session.user_agent())
            .bind(stamp(session.expires_at()))
            .bind(MySqlBoolConverter.to_db(&session.is_active()))
            .bind(session.id().get())
            .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 && !self.exists(session.id()).await? {
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
                .bind(MySqlUuidConverter.to_db(&token.as_uuid()))
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
                .bind(stamp(self.clock.now()))
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
            .bind(stamp(self.clock.now()))
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
                 CAST(COALESCE(SUM(is_active = 1 AND expires_at > ?), 0) AS SIGNED) AS active_sessions, \
                 CAST(COALESCE(SUM(expires_at <= ?), 0) AS SIGNED) AS expired_sessions, \
                 CAST(COALESCE(SUM(created_at >= ?), 0) AS SIGNED) AS sessions_24h, \
                 CAST(COALESCE(SUM(created_at >= ?), 0) AS SIGNED) AS sessions_7d, \
                 CAST(COALESCE(SUM(created_at >= ?), 0) AS SIGNED) AS sessions_30d \
                 FROM user_sessions",
            )
            .bind(stamp(now))
            .bind(stamp(now))
            .bind(stamp(now - ChronoDuration::hours(24)))
            .bind(stamp(now - ChronoDuration::days(7)))
            .bind(stamp(now - ChronoDuration::days(30)))
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(row.into())
    }
}
