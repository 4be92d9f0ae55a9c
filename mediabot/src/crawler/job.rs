//! Crawler jobs and the worker kind each one runs on.

use std::fmt;

use crate::bus::{CrawlerRequest, JobAction, TorrentPayload};
use crate::domain::{MediaKey, MediaRecord};

/// One unit of crawler work: an action on one media record.
#[derive(Debug, Clone)]
pub struct MediaTask {
    pub action: JobAction,
    pub user_id: i64,
    /// Snapshot of the record taken when the job was created.
    pub media: MediaRecord,
    /// The request the job was created from.
    pub request: CrawlerRequest,
}

impl MediaTask {
    /// Build the job for `media`, skipping the search stage when the record
    /// already knows its download URL.
    pub fn new(requested: JobAction, request: &CrawlerRequest, media: MediaRecord) -> Self {
        Self {
            action: infer_action(requested, &media),
            user_id: request.user_id,
            media,
            request: request.clone(),
        }
    }

    pub fn key(&self) -> MediaKey {
        self.media.key()
    }

    pub fn text_query(&self) -> String {
        self.media.text_query()
    }

    /// Torrent handle from the request, falling back to the record's.
    pub fn torrent_handle(&self) -> Option<&str> {
        self.request
            .torrent_handle
            .as_deref()
            .or(self.media.torrent_handle.as_deref())
            .filter(|h| !h.is_empty())
    }

    pub fn torrent(&self) -> Option<&TorrentPayload> {
        self.request.torrent.as_ref()
    }
}

impl fmt::Display for MediaTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MediaTask<{} user:{} media:{}>",
            self.action,
            self.user_id,
            self.key()
        )
    }
}

/// Action a job actually runs.
///
/// Client-management requests are kept as they are. Any other request for a
/// record with a resolved download URL goes straight to the file fetch.
pub fn infer_action(requested: JobAction, media: &MediaRecord) -> JobAction {
    if requested.is_client_management() || media.download_url().is_none() {
        requested
    } else {
        JobAction::DownloadFile
    }
}

/// The worker implementations a job can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    TorrentSearch,
    Download,
    TorrentClient,
}

impl WorkerKind {
    pub fn for_action(action: JobAction) -> Self {
        match action {
            JobAction::ForceCheck
            | JobAction::CheckFilms
            | JobAction::CheckSerials
            | JobAction::Check => Self::TorrentSearch,
            JobAction::DownloadFile => Self::Download,
            JobAction::AddToClient | JobAction::WatchProgress => Self::TorrentClient,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TorrentSearch => "torrent-search",
            Self::Download => "download",
            Self::TorrentClient => "torrent-client",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
