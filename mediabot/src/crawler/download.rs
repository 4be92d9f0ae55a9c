//! Torrent file download worker.

use async_trait::async_trait;
use tracing::{debug, info};

use super::job::MediaTask;
use super::replies;
use super::worker::{ResultSink, Worker};
use crate::trackers::{Trackers, metainfo};
use crate::{Error, Result};

/// Fetches the torrent file behind a record's resolved download URL.
pub struct DownloadWorker {
    trackers: Trackers,
}

impl DownloadWorker {
    pub fn new(trackers: Trackers) -> Self {
        Self { trackers }
    }
}

#[async_trait]
impl Worker for DownloadWorker {
    fn name(&self) -> &'static str {
        "download"
    }

    async fn run(&self, task: MediaTask, results: ResultSink) -> Result<()> {
        let url = task
            .media
            .download_url()
            .ok_or_else(|| Error::validation(format!("{task} has no download url")))?;

        let file = self
            .trackers
            .fetch(task.media.tracker.as_deref(), url)
            .await?;
        let files = metainfo::media_file_count(&file.data)?;

        let Some(update) = replies::download_update(&task.media, files) else {
            debug!(files, "Torrent brings no new episodes");
            return Ok(());
        };

        info!(torrent = %file.id, files, "Torrent file fetched");
        results.extend(replies::download_started(&task, update, file.into()));
        Ok(())
    }
}
