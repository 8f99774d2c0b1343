//! Database connection management

use anyhow::{Context, Result};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use template_sqlc_config::{DatabaseConfig, DatabaseEngine};
use tokio::fs;
use tracing::info;

/// Pool for whichever engine the configuration names.
#[derive(Debug, Clone)]
pub enum DatabasePool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
    MySql(MySqlPool),
}

impl DatabasePool {
    pub fn engine(&self) -> DatabaseEngine {
        match self {
            Self::Sqlite(_) => DatabaseEngine::Sqlite,
            Self::Postgres(_) => DatabaseEngine::Postgres,
            Self::MySql(_) => DatabaseEngine::MySql,
        }
    }

    /// Round-trip a trivial query.
    pub async fn test_connection(&self) -> Result<()> {
        match self {
            Self::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(drop),
            Self::Postgres(pool) => sqlx::query("SELECT 1").execute(pool).await.map(drop),
            Self::MySql(pool) => sqlx::query("SELECT 1").execute(pool).await.map(drop),
        }
        .context("failed to test database connection")
    }

    pub async fn close(&self) {
        match self {
            Self::Sqlite(pool) => pool.close().await,
            Self::Postgres(pool) => pool.close().await,
            Self::MySql(pool) => pool.close().await,
        }
    }
}

/// Prepare and establish a pool for the configured engine.
pub async fn prepare_database(config: &DatabaseConfig) -> Result<DatabasePool> {
    let engine = config.engine()?;
    let acquire_timeout = Duration::from_secs(config.acquire_timeout_seconds);

    let pool = match engine {
        DatabaseEngine::Sqlite => DatabasePool::Sqlite(prepare_sqlite(config, acquire_timeout).await?),
        DatabaseEngine::Postgres => DatabasePool::Postgres(
            PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(acquire_timeout)
                .connect(&config.url)
                .await
                .with_context(|| format!("failed to connect to postgres database {}", redact(&config.url)))?,
        ),
        DatabaseEngine::MySql => DatabasePool::MySql(
            MySqlPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(acquire_timeout)
                .connect(&config.url)
                .await
                .with_context(|| format!("failed to connect to mysql database {}", redact(&config.url)))?,
        ),
    };

    info!(engine = %engine, url = %redact(&config.url), "database connection established");
    Ok(pool)
}

async fn prepare_sqlite(config: &DatabaseConfig, acquire_timeout: Duration) -> Result<SqlitePool> {
    let in_memory = is_sqlite_memory(&config.url);
    if !in_memory {
        ensure_sqlite_path(&config.url).await?;
    }

    let mut options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("invalid sqlite url {}", config.url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    // Every connection to `:memory:` is its own database, so keep exactly
    // one alive for the lifetime of the pool.
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };

    pool_options
        .acquire_timeout(acquire_timeout)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to connect to database {}", config.url))
}

fn is_sqlite_memory(url: &str) -> bool {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    path.split('?').next() == Some(":memory:")
}

/// Ensure the SQLite database directory exists
async fn ensure_sqlite_path(url: &str) -> Result<()> {
    let Some(sqlite_path) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };
    let sqlite_path = sqlite_path.split('?').next().unwrap_or(sqlite_path);

    let path = Path::new(sqlite_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("failed to create sqlite directory {}", parent.display())
            })?;
        }
    }

    Ok(())
}

/// Hide the password part of a connection URL before logging it.
fn redact(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}
