//! Torrent search worker.

use async_trait::async_trait;
use chrono::Datelike;
use tracing::{debug, info};

use super::job::MediaTask;
use super::matcher::{MatchSettings, MatchTarget, best_match};
use super::replies;
use super::worker::{ResultSink, Worker};
use crate::Result;
use crate::bus::JobAction;
use crate::trackers::Trackers;

/// Searches every tracker for the task's record and arbitrates the results.
pub struct TorrentSearchWorker {
    trackers: Trackers,
    settings: MatchSettings,
}

impl TorrentSearchWorker {
    pub fn new(trackers: Trackers, settings: MatchSettings) -> Self {
        Self { trackers, settings }
    }
}

#[async_trait]
impl Worker for TorrentSearchWorker {
    fn name(&self) -> &'static str {
        "torrent-search"
    }

    async fn run(&self, task: MediaTask, results: ResultSink) -> Result<()> {
        let query = task.text_query();
        let candidates = self.trackers.search(&query).await;

        let target = MatchTarget {
            catalog_id: Some(task.media.media_id).filter(|id| *id != 0),
            year: task.media.year,
            is_film: !task.media.is_serial(),
        };
        let current_year = chrono::Local::now().year();
        let matched = best_match(&candidates, &target, &self.settings, current_year);

        debug!(
            query = %query,
            found = candidates.len(),
            matched = matched.len(),
            "Search arbitrated"
        );

        match matched.as_slice() {
            [] if task.action == JobAction::ForceCheck => {
                results.push(replies::not_found(&task));
            }
            [] => debug!(query = %query, "Nothing matched"),
            [single] => {
                info!(query = %query, url = %single.source_url, "Torrent picked");
                results.push(replies::torrent_found(&task, single));
            }
            several => {
                results.push(replies::choose_torrent(&task, several));
            }
        }
        Ok(())
    }
}
