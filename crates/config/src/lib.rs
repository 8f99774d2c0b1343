use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "template-sqlc.toml",
    "config/template-sqlc.toml",
    "crates/config/template-sqlc.toml",
    "../template-sqlc.toml",
    "../config/template-sqlc.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sessions: SessionConfig,
    pub events: EventsConfig,
}

/// Storage engines the adapters are written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    Sqlite,
    Postgres,
    MySql,
}

impl DatabaseEngine {
    /// Infer the engine from a connection URL scheme.
    ///
    /// ```
    /// use template_sqlc_config::DatabaseEngine;
    ///
    /// assert_eq!(DatabaseEngine::from_url("sqlite://users.db").unwrap(), DatabaseEngine::Sqlite);
    /// assert_eq!(DatabaseEngine::from_url("postgresql://localhost/app").unwrap(), DatabaseEngine::Postgres);
    /// assert_eq!(DatabaseEngine::from_url("mysql://root@localhost/app").unwrap(), DatabaseEngine::MySql);
    /// assert!(DatabaseEngine::from_url("redis://localhost").is_err());
    /// ```
    pub fn from_url(url: &str) -> anyhow::Result<Self> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default();

        match scheme.as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            _ => bail!("unsupported database url scheme `{scheme}`"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    #[serde(default = "DatabaseConfig::default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
    #[serde(default = "DatabaseConfig::default_query_timeout")]
    pub query_timeout_seconds: u64,
    #[serde(default = "DatabaseConfig::default_run_migrations")]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    const fn default_acquire_timeout() -> u64 {
        5
    }

    const fn default_query_timeout() -> u64 {
        10
    }

    const fn default_run_migrations() -> bool {
        true
    }

    pub fn engine(&self) -> anyhow::Result<DatabaseEngine> {
        DatabaseEngine::from_url(&self.url)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://template-sqlc.db".to_string(),
            max_connections: 10,
            acquire_timeout_seconds: Self::default_acquire_timeout(),
            query_timeout_seconds: Self::default_query_timeout(),
            run_migrations: Self::default_run_migrations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "SessionConfig::default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

impl SessionConfig {
    const fn default_cleanup_interval() -> u64 {
        300
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: Self::default_cleanup_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "EventsConfig::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl EventsConfig {
    const fn default_queue_capacity() -> usize {
        1024
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: Self::default_queue_capacity(),
        }
    }
}

fn clamp_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use template_sqlc_config::load;
///
/// std::env::remove_var("TEMPLATE_SQLC_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.database.url.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default(
            "database.acquire_timeout_seconds",
            clamp_to_i64(defaults.database.acquire_timeout_seconds),
        )?
        .set_default(
            "database.query_timeout_seconds",
            clamp_to_i64(defaults.database.query_timeout_seconds),
        )?
        .set_default("database.run_migrations", defaults.database.run_migrations)?
        .set_default(
            "sessions.cleanup_interval_seconds",
            clamp_to_i64(defaults.sessions.cleanup_interval_seconds),
        )?
        .set_default(
            "events.queue_capacity",
            i64::try_from(defaults.events.queue_capacity).unwrap_or(i64::MAX),
        )?;

    let environment_overrides =
        config::Environment::with_prefix("TEMPLATE_SQLC").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("TEMPLATE_SQLC_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via TEMPLATE_SQLC_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    validate(&config)?;

    debug!(?config, "loaded configuration");
    Ok(config)
}

fn validate(config: &AppConfig) -> anyhow::Result<()> {
    config
        .database
        .engine()
        .context("invalid database.url")?;

    if config.database.max_connections == 0 {
        bail!("database.max_connections must be at least 1");
    }
    if config.database.query_timeout_seconds == 0 {
        bail!("database.query_timeout_seconds must be at least 1");
    }
    if config.sessions.cleanup_interval_seconds == 0 {
        bail!("sessions.cleanup_interval_seconds must be at least 1");
    }
    if config.events.queue_capacity == 0 {
        bail!("events.queue_capacity must be at least 1");
    }

    Ok(())
}
