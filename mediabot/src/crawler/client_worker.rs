//! Torrent client worker: submits torrent files and watches their progress.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info};

use super::job::MediaTask;
use super::replies;
use super::worker::{ResultSink, Worker};
use crate::bus::JobAction;
use crate::config::TorrentClientConfig;
use crate::torrent_client::TorrentClientBackend;
use crate::{Error, Result};

pub struct TorrentClientWorker {
    backend: Arc<dyn TorrentClientBackend>,
    config: TorrentClientConfig,
}

impl TorrentClientWorker {
    pub fn new(backend: Arc<dyn TorrentClientBackend>, config: TorrentClientConfig) -> Self {
        Self { backend, config }
    }

    async fn add(&self, task: &MediaTask, results: &ResultSink) -> Result<()> {
        let torrent = task
            .torrent()
            .ok_or_else(|| Error::validation(format!("{task} carries no torrent file")))?;
        let destination = self.config.destination_for(task.media.kind);

        let handle = self.backend.add_torrent(torrent, &destination).await?;
        info!(
            client = %self.backend.kind(),
            handle = %handle,
            destination = %destination,
            "Torrent added to client"
        );

        if self.backend.tracks_progress() {
            results.push(replies::client_added(task, &handle));
        }
        Ok(())
    }

    /// Poll until the download completes, a forced report was sent, or the
    /// watch times out.
    async fn watch(&self, task: &MediaTask, results: &ResultSink) -> Result<()> {
        if !self.backend.tracks_progress() {
            debug!(client = %self.backend.kind(), "Client does not report progress");
            return Ok(());
        }
        let handle = task
            .torrent_handle()
            .ok_or_else(|| Error::validation(format!("{task} has no torrent handle")))?;

        let interval = Duration::from_secs(self.config.watch_interval_secs.max(1));
        let deadline = Instant::now() + Duration::from_secs(self.config.watch_timeout_secs);
        let force = task.request.force;
        let mut first_poll = true;

        loop {
            let status = self.backend.status(handle).await?;
            debug!(handle, percent = status.percent, "Torrent status");

            if status.is_complete() {
                info!(handle, "Download finished");
                results.extend(replies::finished(task));
                return Ok(());
            }
            if first_poll || force {
                results.push(replies::progress(task, &status));
            }
            if force {
                return Ok(());
            }
            first_poll = false;

            if Instant::now() + interval > deadline {
                info!(handle, "Progress watch timed out");
                return Ok(());
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[async_trait]
impl Worker for TorrentClientWorker {
    fn name(&self) -> &'static str {
        "torrent-client"
    }

    async fn run(&self, task: MediaTask, results: ResultSink) -> Result<()> {
        match task.action {
            JobAction::AddToClient => self.add(&task, &results).await,
            JobAction::WatchProgress => self.watch(&task, &results).await,
            other => Err(Error::validation(format!(
                "{other} is not a torrent client action"
            ))),
        }
    }
}
