use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use template_sqlc_config::AppConfig;
use template_sqlc_database::{initialize_database, AdapterOptions, DatabasePool, Repositories};
use template_sqlc_users::{
    ChannelEventPublisher, SessionRepository, SystemClock, UserEvent, UserService,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    /// Install the global fmt subscriber, filtered by `RUST_LOG` (default `info`).
    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .with_target(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Everything a host process needs to serve the user core.
pub struct BackendServices {
    pub db_pool: DatabasePool,
    pub repositories: Repositories,
    pub user_service: Arc<UserService>,
    pub events: ChannelEventPublisher,
    event_logger: JoinHandle<u64>,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database)
            .await
            .context("failed to initialise database")?;

        let repositories = Repositories::for_pool(
            &db_pool,
            AdapterOptions {
                query_timeout: Duration::from_secs(config.database.query_timeout_seconds),
                clock: Arc::new(SystemClock),
            },
        );

        let (events, receiver) = ChannelEventPublisher::bounded(config.events.queue_capacity);
        let event_logger = spawn_event_logger(receiver);

        let user_service = Arc::new(UserService::new(
            repositories.users.clone(),
            repositories.sessions.clone(),
            Arc::new(events.clone()),
        ));

        info!(
            engine = %db_pool.engine(),
            event_queue = config.events.queue_capacity,
            "backend services ready"
        );

        Ok(Self {
            db_pool,
            repositories,
            user_service,
            events,
            event_logger,
        })
    }

    /// Start the periodic expired-session sweep for these repositories.
    pub fn spawn_session_sweeper(&self, config: &AppConfig) -> JoinHandle<()> {
        spawn_session_sweeper(
            self.repositories.sessions.clone(),
            Duration::from_secs(config.sessions.cleanup_interval_seconds),
        )
    }

    /// Drain queued events and close the pool. Returns the number of events
    /// the logger handled. Clones of the service held elsewhere keep the
    /// queue open, so drop them first.
    pub async fn shutdown(self) -> u64 {
        let Self {
            db_pool,
            repositories,
            user_service,
            events,
            event_logger,
        } = self;
        drop(user_service);
        drop(events);
        drop(repositories);

        let logged = match event_logger.await {
            Ok(logged) => logged,
            Err(error) => {
                warn!(%error, "event logger task failed");
                0
            }
        };
        db_pool.close().await;
        info!(events_logged = logged, "backend services stopped");
        logged
    }
}

/// Log every published event until all publishers are gone.
pub fn spawn_event_logger(mut receiver: mpsc::Receiver<UserEvent>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut logged = 0;
        while let Some(event) = receiver.recv().await {
            info!(
                event_id = %event.id,
                event_type = %event.event_type,
                user_id = ?event.user_id,
                "user event"
            );
            logged += 1;
        }
        debug!(logged, "event queue closed");
        logged
    })
}

/// Run `cleanup_expired` every `every` until the handle is aborted. The
/// first sweep happens immediately.
pub fn spawn_session_sweeper(
    sessions: Arc<dyn SessionRepository>,
    every: Duration,
) -> JoinHandle<()> {
    let every = every.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sessions.cleanup_expired().await {
                Ok(0) => debug!("no expired sessions"),
                Ok(swept) => info!(swept, "expired sessions deactivated"),
                Err(error) => warn!(%error, kind = error.kind(), "session sweep failed"),
            }
        }
    })
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
