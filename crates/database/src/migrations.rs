//! Embedded schema migrations, one set per engine.

use anyhow::Context;
use sqlx::migrate::Migrator;
use tracing::info;

use crate::connection::DatabasePool;

pub static SQLITE_MIGRATOR: Migrator = sqlx::migrate!("./migrations/sqlite");
pub static POSTGRES_MIGRATOR: Migrator = sqlx::migrate!("./migrations/postgres");
pub static MYSQL_MIGRATOR: Migrator = sqlx::migrate!("./migrations/mysql");

/// Apply the pending migrations for the pool's engine.
pub async fn run_migrations(pool: &DatabasePool) -> anyhow::Result<()> {
    match pool {
        DatabasePool::Sqlite(pool) => SQLITE_MIGRATOR.run(pool).await,
        DatabasePool::Postgres(pool) => POSTGRES_MIGRATOR.run(pool).await,
        DatabasePool::MySql(pool) => MYSQL_MIGRATOR.run(pool).await,
    }
    .with_context(|| format!("{} database migrations failed", pool.engine()))?;

    info!(engine = %pool.engine(), "database migrations applied");
    Ok(())
}
