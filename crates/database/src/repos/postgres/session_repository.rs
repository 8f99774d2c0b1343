use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use template_sqlc_users::{
    Clock, DomainError, DomainResult, SessionId, SessionRepository, SessionStats, SessionToken,
    UserId, UserSession,
};
use tracing::debug;

use super::rows::{SessionRow, SESSION_COLUMNS};
use crate::converters::postgres::{PostgresBoolConverter, PostgresUuidConverter};
use crate::converters::{Converter, DeviceInfoConverter, IpAddressConverter};
use crate::errors::bounded;
use crate::repos::{AdapterOptions, SessionStatsRow, SESSION};

pub struct PostgresSessionRepository {
    pool: PgPool,
    query_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl PostgresSessionRepository {
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
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn create(&self, session: &UserSession) -> DomainResult<UserSession> {
        let (id,): (i64,) = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query_as(
                "INSERT INTO user_sessions (user_id, token, device_info, ip_address, user_agent, \
                 created_at, expires_at, is_active) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 RETURNING id",
            )
            .bind(session.user_id().get())
            .bind(PostgresUuidConverter.to_db(&session.token().as_uuid()))
            .bind(DeviceInfoConverter.to_db(session.device_info()))
            .bind(IpAddressConverter.to_db(&session.ip_address()))
            .bind(session.user_agent())
            .bind(session.created_at())
            .bind(session.expires_at())
            .bind(PostgresBoolConverter.to_db(&session.is_active()))
            .fetch_one(&self.pool),
        )
        .await?;

        let id = SessionId::new(id);
        debug!(session_id = %id, user_id = %session.user_id(), "session row inserted");
        Ok(session.clone().with_id(id))
    }

    async fn get_by_token(&self, token: &SessionToken) -> DomainResult<UserSession> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM user_sessions WHERE token = $1");
        let row: Option<SessionRow> = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query_as(&sql)
                .bind(token.as_uuid())
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
        // `$2` is NULL when every session is wanted.
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM user_sessions WHERE user_id = $1 \
             AND ($2::timestamptz IS NULL OR (is_active AND expires_at > $2)) \
             ORDER BY created_at DESC, id DESC"
        );
        let live_after = active_only.then(|| self.clock.now());
        let rows: Vec<SessionRow> = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query_as(&sql)
                .bind(user_id.get())
                .bind(live_after)
                .fetch_all(&self.pool),
        )
        .await?;

        rows.into_iter()
            .map(|row| row.into_session().map_err(DomainError::from))
            .collect()
    }

    async fn update(&self, session: &UserSession) -> DomainResult<()> {
        let result = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query(
                "UPDATE user_sessions SET device_info = $1, ip_address = $2, user_agent = $3, \
                 expires_at = $4, is_active = $5 WHERE id = $6",
            )
            .bind(DeviceInfoConverter.to_db(session.device_info()))
            .bind(IpAddressConverter.to_db(&session.ip_address()))
            .bind(session.user_agent())
            .bind(session.expires_at())
            .bind(PostgresBoolConverter.to_db(&session.is_active()))
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
            sqlx::query("DELETE FROM user_sessions WHERE id = $1")
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
            sqlx::query("UPDATE user_sessions SET is_active = FALSE WHERE token = $1")
                .bind(token.as_uuid())
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn deactivate_by_user_id(&self, user_id: UserId) -> DomainResult<u64> {
        let result = bounded(
            self.query_timeout,
            SESSION,
            sqlx::query("UPDATE user_sessions SET is_active = FALSE WHERE user_id = $1 AND is_active")
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
            sqlx::query("UPDATE user_sessions SET is_active = FALSE WHERE is_active AND expires_at <= $1")
                .bind(self.clock.now())
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
                "SELECT COUNT(*) FROM user_sessions WHERE user_id = $1 AND is_active AND expires_at > $2",
            )
            .bind(user_id.get())
            .bind(self.clock.now())
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
                 COUNT(*) FILTER (WHERE is_active AND expires_at > $1) AS active_sessions, \
                 COUNT(*) FILTER (WHERE expires_at <= $1) AS expired_sessions, \
                 COUNT(*) FILTER (WHERE created_at >= $2) AS sessions_24h, \
                 COUNT(*) FILTER (WHERE created_at >= $3) AS sessions_7d, \
                 COUNT(*) FILTER (WHERE created_at >= $4) AS sessions_30d \
                 FROM user_sessions",
            )
            .bind(now)
            .bind(now - ChronoDuration::hours(24))
            .bind(now - ChronoDuration::days(7))
            .bind(now - ChronoDuration::days(30))
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(row.into())
    }
}
