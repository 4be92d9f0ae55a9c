//! The crawler actor: turns crawler requests into jobs and schedules them.
//!
//! Every tick runs three phases under one lock: reap results from running
//! workers, flush them to the bus, and admit queued jobs while there is
//! room. Requests arriving through the mailbox only append to the queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::client_worker::TorrentClientWorker;
use super::download::DownloadWorker;
use super::job::{MediaTask, WorkerKind};
use super::matcher::MatchSettings;
use super::search::TorrentSearchWorker;
use super::worker::{Worker, WorkerHandle};
use crate::bus::{Action, Actor, ActorContext, Component, CrawlerRequest, Envelope, JobAction};
use crate::config::{CrawlerConfig, TorrentClientConfig};
use crate::database::MediaStore;
use crate::torrent_client::TorrentClientBackend;
use crate::trackers::Trackers;
use crate::{Error, Result};

const CRAWLER_ACTIONS: [Action; 7] = [
    Action::ForceCheck,
    Action::CheckFilms,
    Action::CheckSerials,
    Action::Check,
    Action::AddToClient,
    Action::WatchProgress,
    Action::DownloadFile,
];

/// Everything a crawler instance is built from.
#[derive(Clone)]
pub struct CrawlerDeps {
    pub store: Arc<dyn MediaStore>,
    pub trackers: Trackers,
    pub backend: Arc<dyn TorrentClientBackend>,
    pub config: CrawlerConfig,
    pub client_config: TorrentClientConfig,
}

/// Outcome of one scheduling tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub reaped: usize,
    pub sent: usize,
    pub failed: usize,
    pub admitted: usize,
}

#[derive(Default)]
struct SchedulerState {
    jobs: VecDeque<MediaTask>,
    active: Vec<WorkerHandle>,
    outbound: Vec<Envelope>,
    next_worker_id: u64,
}

pub struct Crawler {
    store: Arc<dyn MediaStore>,
    search: Arc<dyn Worker>,
    download: Arc<dyn Worker>,
    client: Arc<dyn Worker>,
    concurrency: usize,
    tick_interval: Duration,
    state: Mutex<SchedulerState>,
}

impl Crawler {
    pub fn new(deps: CrawlerDeps) -> Self {
        let settings = MatchSettings::from(&deps.config);
        Self {
            search: Arc::new(TorrentSearchWorker::new(deps.trackers.clone(), settings)),
            download: Arc::new(DownloadWorker::new(deps.trackers)),
            client: Arc::new(TorrentClientWorker::new(deps.backend, deps.client_config)),
            store: deps.store,
            concurrency: deps.config.workers.max(1),
            tick_interval: Duration::from_secs(deps.config.tick_interval_secs.max(1)),
            state: Mutex::new(SchedulerState::default()),
        }
    }

    fn worker_for(&self, kind: WorkerKind) -> Arc<dyn Worker> {
        match kind {
            WorkerKind::TorrentSearch => self.search.clone(),
            WorkerKind::Download => self.download.clone(),
            WorkerKind::TorrentClient => self.client.clone(),
        }
    }

    /// Build one job per record addressed by `request`.
    pub async fn jobs_for(
        &self,
        action: JobAction,
        request: &CrawlerRequest,
    ) -> Result<Vec<MediaTask>> {
        let records = if request.is_broad() {
            self.store.find_all_pending(request.kind).await?
        } else {
            match self.store.find_media(&request.key()).await? {
                Some(record) => vec![record],
                None => {
                    error!(
                        media = %request.key(),
                        action = %action,
                        "No media record for crawler request"
                    );
                    return Ok(Vec::new());
                }
            }
        };

        Ok(records
            .into_iter()
            .map(|media| MediaTask::new(action, request, media))
            .collect())
    }

    pub fn enqueue(&self, jobs: impl IntoIterator<Item = MediaTask>) {
        self.state.lock().jobs.extend(jobs);
    }

    pub fn queued_jobs(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub fn active_workers(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Run one reap, flush and admit cycle.
    pub fn tick(&self, ctx: &ActorContext) -> TickReport {
        let mut report = TickReport::default();
        let mut state = self.state.lock();

        // Reap: completion is observed before draining, so every result a
        // finished worker published is already in its channel.
        let mut outbound = std::mem::take(&mut state.outbound);
        state.active.retain_mut(|worker| {
            let finished = worker.is_finished();
            let results = worker.drain();
            report.reaped += results.len();
            outbound.extend(results);
            !finished
        });

        // Flush: every envelope is attempted once; the buffer is cleared either way.
        for envelope in outbound {
            let label = format!("{envelope:?}");
            match ctx.send_message(envelope) {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(envelope = %label, error = %e, "Failed to send worker result");
                }
            }
        }

        // Admit.
        while state.active.len() < self.concurrency {
            let Some(job) = state.jobs.pop_front() else {
                break;
            };
            let kind = WorkerKind::for_action(job.action);
            let id = state.next_worker_id;
            state.next_worker_id += 1;

            debug!(worker = id, kind = %kind, task = %job, "Starting worker");
            let handle = WorkerHandle::start(id, self.worker_for(kind), job, ctx.token());
            state.active.push(handle);
            report.admitted += 1;
        }

        report
    }

    fn kill_workers(&self) {
        let state = self.state.lock();
        for worker in &state.active {
            worker.kill();
        }
    }
}

#[async_trait]
impl Actor for Crawler {
    fn component(&self) -> Component {
        Component::Crawler
    }

    fn accepted_actions(&self) -> &'static [Action] {
        &CRAWLER_ACTIONS
    }

    async fn handle_message(&self, envelope: Envelope, _ctx: &ActorContext) -> Result<()> {
        let action = envelope
            .job_action()
            .ok_or_else(|| Error::validation(format!("{envelope:?} is not a crawler job")))?;
        let request = envelope.crawler_request()?;

        let jobs = self.jobs_for(action, request).await?;
        debug!(action = %action, jobs = jobs.len(), "Jobs queued");
        self.enqueue(jobs);
        Ok(())
    }

    async fn main_activity(&self, ctx: ActorContext) -> Result<()> {
        info!(
            workers = self.concurrency,
            interval_secs = self.tick_interval.as_secs(),
            "Crawler scheduler started"
        );
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.tick(&ctx);
                    if report != TickReport::default() {
                        debug!(?report, "Scheduler tick");
                    }
                }
            }
        }

        self.kill_workers();
        info!("Crawler scheduler stopped");
        Ok(())
    }
}
