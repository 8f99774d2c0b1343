//! Template-sqlc Database Crate
//!
//! Storage adapters for the user domain: connection management for SQLite,
//! PostgreSQL and MySQL, embedded migrations per engine, the converters that
//! move domain values in and out of each engine's column types, and the
//! repository implementations themselves.

pub mod connection;
pub mod converters;
pub mod errors;
pub mod migrations;
pub mod repos;

pub use connection::{prepare_database, DatabasePool};
pub use converters::{ConversionError, Converter};
pub use migrations::run_migrations;
pub use repos::{
    AdapterOptions, MySqlSessionRepository, MySqlUserRepository, PostgresSessionRepository,
    PostgresUserRepository, Repositories, SqliteSessionRepository, SqliteUserRepository,
    DEFAULT_QUERY_TIMEOUT,
};

use template_sqlc_config::DatabaseConfig;

/// Connect and, when the configuration asks for it, bring the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> anyhow::Result<DatabasePool> {
    let pool = prepare_database(config).await?;
    if config.run_migrations {
        run_migrations(&pool).await?;
    }
    Ok(pool)
}
