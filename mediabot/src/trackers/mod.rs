//! Torrent tracker backends.
//!
//! A [`TrackerBackend`] searches one external index and fetches torrent
//! files from it. [`Trackers`] fans a search out over every configured
//! backend and isolates their failures from each other.

mod jackett;
pub mod metainfo;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::bus::TorrentPayload;
use crate::config::TrackersConfig;
use crate::{Error, Result};

pub use jackett::JackettTracker;

/// One search result with the attributes used for ranking.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Candidate {
    pub label: String,
    /// Where the torrent file is downloaded from.
    pub source_url: String,
    /// Human-facing topic page.
    pub detail_url: String,
    pub size_gb: f64,
    pub seeders: u32,
    /// Vertical resolution, when the release names one.
    pub resolution: Option<u32>,
    /// Upper-case audio language tags.
    pub audio: Vec<String>,
    /// Upper-case subtitle language tags.
    pub subtitles: Vec<String>,
    pub advert: bool,
    pub file_count: u32,
    pub tracker: String,
    /// Catalog id the release is linked to, if known.
    pub catalog_id: Option<u64>,
}

impl Candidate {
    pub fn has_audio(&self, tag: &str) -> bool {
        self.audio.iter().any(|a| a.eq_ignore_ascii_case(tag))
    }
}

/// Raw torrent file fetched from a tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentFile {
    /// Tracker-side id of the torrent.
    pub id: String,
    pub data: Bytes,
}

impl From<TorrentFile> for TorrentPayload {
    fn from(file: TorrentFile) -> Self {
        Self {
            id: file.id,
            data: file.data,
        }
    }
}

/// An external torrent index.
#[async_trait]
pub trait TrackerBackend: Send + Sync {
    /// Name recorded on candidates and media records.
    fn name(&self) -> &str;

    /// Whether `url` points at this tracker.
    fn accepts(&self, url: &str) -> bool;

    async fn search(&self, query: &str) -> Result<Vec<Candidate>>;

    async fn fetch(&self, url: &str) -> Result<TorrentFile>;
}

/// The set of configured trackers.
#[derive(Clone, Default)]
pub struct Trackers {
    backends: Vec<Arc<dyn TrackerBackend>>,
}

impl Trackers {
    pub fn new(backends: Vec<Arc<dyn TrackerBackend>>) -> Self {
        Self { backends }
    }

    /// Build the backends named in the configuration.
    pub fn from_config(config: &TrackersConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(60));
        let mut backends: Vec<Arc<dyn TrackerBackend>> = Vec::new();

        if let Some(jackett) = &config.jackett {
            let client = crate::utils::http_client::build_client(config.proxy.as_deref(), timeout)?;
            backends.push(Arc::new(JackettTracker::new(jackett.clone(), client)));
        }

        if backends.is_empty() {
            warn!("No torrent trackers configured, searches will find nothing");
        }
        Ok(Self::new(backends))
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Search every backend and concatenate the results.
    ///
    /// A failing backend is logged and contributes no candidates.
    pub async fn search(&self, query: &str) -> Vec<Candidate> {
        let results = join_all(self.backends.iter().map(|b| b.search(query))).await;

        let mut candidates = Vec::new();
        for (backend, result) in self.backends.iter().zip(results) {
            match result {
                Ok(found) => {
                    debug!(tracker = backend.name(), query, count = found.len(), "Search finished");
                    candidates.extend(found);
                }
                Err(e) => {
                    warn!(tracker = backend.name(), query, error = %e, "Tracker search failed");
                }
            }
        }
        candidates
    }

    /// The backend owning `url`, preferring the one named `tracker`.
    pub fn backend_for(&self, tracker: Option<&str>, url: &str) -> Option<Arc<dyn TrackerBackend>> {
        tracker
            .and_then(|name| self.backends.iter().find(|b| b.name() == name))
            .or_else(|| self.backends.iter().find(|b| b.accepts(url)))
            .cloned()
    }

    pub async fn fetch(&self, tracker: Option<&str>, url: &str) -> Result<TorrentFile> {
        let url = crate::utils::url::with_scheme(url);
        let backend = self
            .backend_for(tracker, &url)
            .ok_or_else(|| Error::not_found("tracker", url.clone()))?;
        backend.fetch(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl TrackerBackend for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn accepts(&self, url: &str) -> bool {
            url.contains(self.name)
        }

        async fn search(&self, _query: &str) -> Result<Vec<Candidate>> {
            if self.fail {
                return Err(Error::tracker(self.name, "offline"));
            }
            Ok(vec![Candidate {
                label: format!("from {}", self.name),
                tracker: self.name.to_string(),
                ..Default::default()
            }])
        }

        async fn fetch(&self, url: &str) -> Result<TorrentFile> {
            Ok(TorrentFile {
                id: url.to_string(),
                data: Bytes::new(),
            })
        }
    }

    fn trackers() -> Trackers {
        Trackers::new(vec![
            Arc::new(Fixed { name: "alpha", fail: false }),
            Arc::new(Fixed { name: "beta", fail: true }),
            Arc::new(Fixed { name: "gamma", fail: false }),
        ])
    }

    #[tokio::test]
    async fn test_search_tolerates_failing_backend() {
        let found = trackers().search("Heat 1995").await;
        let labels: Vec<_> = found.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["from alpha", "from gamma"]);
    }

    #[tokio::test]
    async fn test_fetch_picks_named_then_matching_backend() {
        let trackers = trackers();
        let named = trackers.backend_for(Some("gamma"), "https://alpha/1").unwrap();
        assert_eq!(named.name(), "gamma");

        let file = trackers.fetch(None, "//alpha/dl/5").await.unwrap();
        assert_eq!(file.id, "https://alpha/dl/5");

        assert!(matches!(
            trackers.fetch(None, "https://unknown/1").await,
            Err(Error::NotFound { .. })
        ));
    }
}
