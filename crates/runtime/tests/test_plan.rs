use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use template_sqlc_config::AppConfig;
use template_sqlc_database::DatabasePool;
use template_sqlc_runtime::{spawn_session_sweeper, BackendServices};
use template_sqlc_users::{
    CreateUserRequest, DeviceInfo, SessionDuration, UserSession,
};
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

const PASSWORD_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2g";

fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.to_string_lossy())
}

fn build_config(database_url: String, max_connections: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = database_url;
    config.database.max_connections = max_connections;
    config
}

async fn initialise(config: &AppConfig) -> Result<BackendServices> {
    BackendServices::initialise(config)
        .await
        .context("failed to initialise backend services")
}

fn signup(email: &str, username: &str) -> CreateUserRequest {
    CreateUserRequest {
        email: email.to_string(),
        username: username.to_string(),
        password_hash: PASSWORD_HASH.to_string(),
        first_name: "Run".to_string(),
        last_name: "Time".to_string(),
        status: None,
        role: None,
        tags: vec![],
        metadata: Default::default(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_runs_migrations() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("runtime/init.db");
    let config = build_config(sqlite_url(&db_path), 4);

    let services = initialise(&config).await?;
    let DatabasePool::Sqlite(pool) = &services.db_pool else {
        panic!("expected a sqlite pool");
    };
    let table: String = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'users'",
    )
    .fetch_one(pool)
    .await?;

    assert_eq!("users", table);
    assert!(db_path.exists());

    services.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_works_with_in_memory_database() -> Result<()> {
    let config = build_config("sqlite://:memory:".into(), 2);
    let services = initialise(&config).await?;

    let user = services
        .user_service
        .create_user(signup("memory@example.com", "memory"))
        .await?;
    assert_eq!(services.user_service.get_user(user.id()).await?.id(), user.id());

    services.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_reports_unsupported_database_urls() -> Result<()> {
    let config = build_config("redis://127.0.0.1:6379".into(), 2);

    let error = match BackendServices::initialise(&config).await {
        Ok(_) => panic!("expected initialisation to fail for a redis url"),
        Err(error) => error,
    };
    let message = format!("{error:?}");
    assert!(
        message.contains("failed to initialise database"),
        "expected database initialisation context, got {message}"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn published_events_are_drained_on_shutdown() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = build_config(sqlite_url(&temp_dir.path().join("events.db")), 2);
    let services = initialise(&config).await?;

    services
        .user_service
        .create_user(signup("first@example.com", "first"))
        .await?;
    services
        .user_service
        .create_user(signup("second@example.com", "second"))
        .await?;
    services
        .user_service
        .authenticate_user("first@example.com", PASSWORD_HASH, "127.0.0.1", "test")
        .await?;

    let logged = timeout(Duration::from_secs(5), services.shutdown()).await?;
    assert_eq!(logged, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn full_event_queue_does_not_fail_writes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = build_config(sqlite_url(&temp_dir.path().join("queue.db")), 2);
    config.events.queue_capacity = 1;
    let services = initialise(&config).await?;

    for i in 0..5 {
        services
            .user_service
            .create_user(signup(&format!("user{i}@example.com"), &format!("user{i}")))
            .await?;
    }
    assert_eq!(services.user_service.get_user_stats().await?.total_users, 5);

    let logged = timeout(Duration::from_secs(5), services.shutdown()).await?;
    assert!((1..=5).contains(&logged));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn session_sweeper_deactivates_expired_sessions() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = build_config(sqlite_url(&temp_dir.path().join("sweeper.db")), 2);
    let services = initialise(&config).await?;

    let user = services
        .user_service
        .create_user(signup("sweep@example.com", "sweep"))
        .await?;
    let stale = UserSession::start(
        user.id(),
        None,
        "test",
        DeviceInfo::default(),
        SessionDuration::Short,
        Utc::now() - chrono::Duration::days(2),
    );
    services.repositories.sessions.create(&stale).await?;
    assert_eq!(
        services.user_service.get_session_stats().await?.expired_sessions,
        1
    );

    let sweeper = spawn_session_sweeper(
        Arc::clone(&services.repositories.sessions),
        Duration::from_millis(20),
    );

    let swept = timeout(Duration::from_secs(5), async {
        loop {
            let sessions = services.user_service.get_user_sessions(user.id(), false).await?;
            if sessions.iter().all(|session| !session.is_active()) {
                return Ok::<_, template_sqlc_users::DomainError>(());
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    sweeper.abort();
    swept??;

    assert_eq!(services.repositories.sessions.cleanup_expired().await?, 0);
    services.shutdown().await;
    Ok(())
}
