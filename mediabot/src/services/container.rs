//! Service container: builds every service and hosts the bus.
//!
//! The container owns the root cancellation token. Cancelling it stops the
//! host loop, the bus loop, every actor and every worker.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::console::ConsoleChat;
use super::dispatcher::CommandDispatcher;
use super::media_server::{LibraryScanner, MediaServerClient};
use crate::Result;
use crate::bus::{Actor, ActorFactory, Component, CrawlerRequest, Envelope, JobAction, Mediator};
use crate::config::AppConfig;
use crate::crawler::{Crawler, CrawlerDeps};
use crate::database::{InMemoryMediaStore, MediaStore, SqlxMediaStore};
use crate::domain::MediaKind;
use crate::torrent_client::{TorrentClientBackend, build_backend};
use crate::trackers::Trackers;

/// Time given to the bus loop to wind down.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// External collaborators the actors are built from.
pub struct ServiceParts {
    pub store: Arc<dyn MediaStore>,
    pub trackers: Trackers,
    pub backend: Arc<dyn TorrentClientBackend>,
    pub scanner: Option<Arc<dyn LibraryScanner>>,
    /// Pool behind `store`, closed on shutdown.
    pub pool: Option<SqlitePool>,
}

/// Service container holding the bus and the shared store.
pub struct ServiceContainer {
    config: AppConfig,
    /// Media store shared by the crawler and the dispatcher.
    pub store: Arc<dyn MediaStore>,
    /// Message bus with every actor registered.
    pub mediator: Arc<Mediator>,
    pool: Option<SqlitePool>,
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Build every service from configuration.
    ///
    /// With `dry_run` the store lives in memory and nothing is persisted.
    pub async fn new(config: AppConfig, dry_run: bool) -> Result<Self> {
        info!(dry_run, "Initializing service container");

        let (store, pool): (Arc<dyn MediaStore>, Option<SqlitePool>) = if dry_run {
            (Arc::new(InMemoryMediaStore::new()), None)
        } else {
            let pool =
                crate::database::init_pool(&config.database.url, config.database.max_connections)
                    .await?;
            crate::database::run_migrations(&pool).await?;
            (Arc::new(SqlxMediaStore::new(pool.clone())), Some(pool))
        };

        let trackers = Trackers::from_config(&config.trackers)?;
        let backend = build_backend(&config.torrent_client)?;
        let scanner = match &config.media_server {
            Some(media_server) => {
                Some(Arc::new(MediaServerClient::new(media_server)?) as Arc<dyn LibraryScanner>)
            }
            None => None,
        };

        Self::from_parts(
            config,
            ServiceParts {
                store,
                trackers,
                backend,
                scanner,
                pool,
            },
        )
    }

    /// Build the bus around already constructed collaborators and register
    /// every actor.
    pub fn from_parts(config: AppConfig, parts: ServiceParts) -> Result<Self> {
        let cancellation_token = CancellationToken::new();
        let mediator = Arc::new(Mediator::new(&config.bus, cancellation_token.clone()));

        let crawler_deps = CrawlerDeps {
            store: parts.store.clone(),
            trackers: parts.trackers,
            backend: parts.backend,
            config: config.crawler.clone(),
            client_config: config.torrent_client.clone(),
        };
        let crawler: ActorFactory = Arc::new(move || {
            Ok(Arc::new(Crawler::new(crawler_deps.clone())) as Arc<dyn Actor>)
        });

        let store = parts.store.clone();
        let scanner = parts.scanner;
        let dispatcher: ActorFactory = Arc::new(move || {
            Ok(Arc::new(CommandDispatcher::new(store.clone(), scanner.clone())) as Arc<dyn Actor>)
        });

        let chat: ActorFactory = Arc::new(|| Ok(Arc::new(ConsoleChat::new()) as Arc<dyn Actor>));

        for factory in [chat, dispatcher, crawler] {
            mediator.register(factory)?;
        }
        info!(components = ?mediator.components(), "Services initialized");

        Ok(Self {
            config,
            store: parts.store,
            mediator,
            pool: parts.pool,
            cancellation_token,
        })
    }

    /// Put an envelope on the bus.
    pub fn submit(&self, envelope: Envelope) -> Result<()> {
        self.mediator
            .sender()
            .try_send(envelope)
            .map_err(crate::bus::SendError::from)?;
        Ok(())
    }

    /// Queue a check of every pending record on behalf of the admin user.
    pub fn schedule_broad_check(&self) -> Result<()> {
        let request = CrawlerRequest::broad(self.config.crawler.admin_id, MediaKind::Any);
        debug!(admin_id = request.user_id, "Scheduling broad check");
        self.submit(Envelope::crawler(Component::Main, JobAction::Check, request))
    }

    fn spawn_bus(&self) -> JoinHandle<()> {
        tokio::spawn(self.mediator.clone().run())
    }

    /// Host loop: runs the bus, supervises actors and schedules the
    /// periodic broad check until the container is cancelled.
    pub async fn run(&self) -> Result<()> {
        let token = self.cancellation_token.clone();
        let mut bus = self.spawn_bus();

        let mut supervise = tokio::time::interval(Duration::from_secs(
            self.config.bus.supervise_interval_secs.max(1),
        ));
        supervise.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let periodic_secs = self.config.crawler.periodic_check_secs;
        let periodic_enabled = periodic_secs > 0;
        let mut periodic = tokio::time::interval(Duration::from_secs(periodic_secs.max(1)));
        periodic.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !periodic_enabled {
            info!("Periodic check disabled");
        }

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = supervise.tick() => {
                    if bus.is_finished() && !self.is_shutting_down() {
                        warn!("Bus loop stopped unexpectedly, restarting");
                        bus = self.spawn_bus();
                    }
                    let report = self.mediator.supervise_once();
                    if !report.restarted.is_empty() || !report.pending.is_empty() {
                        info!(
                            restarted = ?report.restarted,
                            pending = ?report.pending,
                            "Supervision pass"
                        );
                    }
                }
                _ = periodic.tick(), if periodic_enabled => {
                    if let Err(e) = self.schedule_broad_check() {
                        warn!(error = %e, "Failed to schedule periodic check");
                    }
                }
            }
        }

        if tokio::time::timeout(DEFAULT_SHUTDOWN_TIMEOUT, bus).await.is_err() {
            warn!("Bus loop did not stop in time");
        }
        Ok(())
    }

    /// Stop every service and close the database pool.
    pub async fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
        self.mediator.shutdown();

        if let Some(pool) = &self.pool {
            info!("Closing database pool...");
            pool.close().await;
        }
        info!("All services shut down");
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
