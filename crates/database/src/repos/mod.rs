//! Storage adapters implementing the domain repository traits, one module
//! per engine.

use sqlx::FromRow;
use std::sync::Arc;
use std::time::Duration;
use template_sqlc_users::{
    Clock, SessionRepository, SessionStats, SystemClock, UserRepository, UserStats,
};

use crate::connection::DatabasePool;

pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::{MySqlSessionRepository, MySqlUserRepository};
pub use postgres::{PostgresSessionRepository, PostgresUserRepository};
pub use sqlite::{SqliteSessionRepository, SqliteUserRepository};

pub(crate) const USER: &str = "user";
pub(crate) const SESSION: &str = "session";

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings every adapter carries.
#[derive(Clone)]
pub struct AdapterOptions {
    pub query_timeout: Duration,
    pub clock: Arc<dyn Clock>,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            clock: Arc::new(SystemClock),
        }
    }
}

/// The pair of adapters for one pool, behind the domain traits.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
}

impl Repositories {
    pub fn for_pool(pool: &DatabasePool, options: AdapterOptions) -> Self {
        match pool {
            DatabasePool::Sqlite(pool) => Self {
                users: Arc::new(SqliteUserRepository::with_options(pool.clone(), options.clone())),
                sessions: Arc::new(SqliteSessionRepository::with_options(pool.clone(), options)),
            },
            DatabasePool::Postgres(pool) => Self {
                users: Arc::new(PostgresUserRepository::with_options(pool.clone(), options.clone())),
                sessions: Arc::new(PostgresSessionRepository::with_options(pool.clone(), options)),
            },
            DatabasePool::MySql(pool) => Self {
                users: Arc::new(MySqlUserRepository::with_options(pool.clone(), options.clone())),
                sessions: Arc::new(MySqlSessionRepository::with_options(pool.clone(), options)),
            },
        }
    }
}

/// Aggregate columns shared by every engine's statistics query.
#[derive(Debug, FromRow)]
pub(crate) struct UserStatsRow {
    pub total_users: i64,
    pub active_users: i64,
    pub inactive_users: i64,
    pub suspended_users: i64,
    pub verified_users: i64,
    pub users_with_logins: i64,
    pub new_users_30d: i64,
    pub new_users_7d: i64,
}

impl From<UserStatsRow> for UserStats {
    fn from(row: UserStatsRow) -> Self {
        UserStats {
            total_users: row.total_users,
            active_users: row.active_users,
            inactive_users: row.inactive_users,
            suspended_users: row.suspended_users,
            verified_users: row.verified_users,
            users_with_logins: row.users_with_logins,
            new_users_30d: row.new_users_30d,
            new_users_7d: row.new_users_7d,
            ..UserStats::default()
        }
        .with_rates()
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct SessionStatsRow {
    pub total_sessions: i64,
    pub active_sessions: i64,
    pub expired_sessions: i64,
    pub sessions_24h: i64,
    pub sessions_7d: i64,
    pub sessions_30d: i64,
}

impl From<SessionStatsRow> for SessionStats {
    fn from(row: SessionStatsRow) -> Self {
        SessionStats {
            total_sessions: row.total_sessions,
            active_sessions: row.active_sessions,
            expired_sessions: row.expired_sessions,
            sessions_24h: row.sessions_24h,
            sessions_7d: row.sessions_7d,
            sessions_30d: row.sessions_30d,
        }
    }
}

/// Each search term becomes a quoted prefix match, OR-ed together.
pub(crate) fn fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"*", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// `to_tsquery` input matching any term by prefix. Characters that carry
/// meaning in tsquery syntax are dropped, so the result is always valid;
/// `None` when nothing searchable is left.
pub(crate) fn prefix_tsquery(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| {
            term.chars()
                .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'))
                .collect::<String>()
        })
        .map(|term| term.trim_matches(|c| matches!(c, '-' | '.' | '@')).to_string())
        .filter(|term| !term.is_empty())
        .map(|term| format!("'{term}':*"))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" | "))
}

/// InnoDB boolean-mode input matching any word by prefix. Words are split
/// the way the full-text parser splits them, so operators never survive.
pub(crate) fn boolean_mode_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|term| !term.is_empty())
        .map(|term| format!("{term}*"))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}

/// Trimmed tags, as the stores compare them.
pub(crate) fn trimmed_tags(tags: &[String]) -> Vec<String> {
    tags.iter().map(|tag| tag.trim().to_string()).collect()
}
