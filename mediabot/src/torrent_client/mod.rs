//! Torrent client backends.
//!
//! Every backend accepts a torrent file and reports download progress for
//! the handle it returned. Which backend is used is decided by
//! configuration alone.

mod deluge;
mod folder;
mod qbittorrent;
mod transmission;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::bus::TorrentPayload;
use crate::config::TorrentClientConfig;
use crate::domain::MediaKind;

pub use deluge::DelugeBackend;
pub use folder::FolderBackend;
pub use qbittorrent::QBittorrentBackend;
pub use transmission::TransmissionBackend;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Supported torrent client kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Deluge,
    Transmission,
    #[serde(alias = "qbit")]
    QBittorrent,
    /// Drop torrent files into a watch directory.
    #[default]
    Folder,
}

impl ClientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deluge => "deluge",
            Self::Transmission => "transmission",
            Self::QBittorrent => "qbittorrent",
            Self::Folder => "folder",
        }
    }

    /// Parse a kind name; the numeric codes of older configs are accepted too.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "deluge" | "0" => Some(Self::Deluge),
            "transmission" | "1" => Some(Self::Transmission),
            "qbittorrent" | "qbit" | "2" => Some(Self::QBittorrent),
            "folder" => Some(Self::Folder),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress of one torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TorrentStatus {
    /// Whole percent, 0 to 100.
    pub percent: u8,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

impl TorrentStatus {
    /// Build from a fractional percentage, clamping into 0..=100.
    pub fn from_percent(percent: f64, bytes_done: u64, bytes_total: u64) -> Self {
        Self {
            percent: percent.clamp(0.0, 100.0).floor() as u8,
            bytes_done,
            bytes_total,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.percent >= 100
    }
}

/// A download daemon, or a stand-in for one.
#[async_trait]
pub trait TorrentClientBackend: Send + Sync {
    fn kind(&self) -> ClientKind;

    /// Whether [`status`](Self::status) can report progress.
    fn tracks_progress(&self) -> bool {
        true
    }

    /// Submit a torrent file, returning the handle used for status polls.
    async fn add_torrent(&self, torrent: &TorrentPayload, destination: &str) -> Result<String>;

    async fn status(&self, handle: &str) -> Result<TorrentStatus>;
}

impl TorrentClientConfig {
    /// Destination handed to the backend for a record of `kind`.
    pub fn destination_for(&self, kind: MediaKind) -> String {
        let serial = kind == MediaKind::Serial;
        match self.kind {
            ClientKind::Folder if serial => self.folder_serial_dir.display().to_string(),
            ClientKind::Folder => self.folder_film_dir.display().to_string(),
            _ if serial => self.serial_dir.clone(),
            _ => self.film_dir.clone(),
        }
    }
}

/// Build the backend selected by configuration.
pub fn build_backend(config: &TorrentClientConfig) -> Result<Arc<dyn TorrentClientBackend>> {
    let backend: Arc<dyn TorrentClientBackend> = match config.kind {
        ClientKind::Folder => Arc::new(FolderBackend),
        kind => {
            let client = crate::utils::http_client::build_client(None, CLIENT_TIMEOUT)?;
            match kind {
                ClientKind::Deluge => Arc::new(DelugeBackend::new(config, client)),
                ClientKind::Transmission => Arc::new(TransmissionBackend::new(config, client)),
                _ => Arc::new(QBittorrentBackend::new(config, client)),
            }
        }
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        assert_eq!(ClientKind::parse("Deluge"), Some(ClientKind::Deluge));
        assert_eq!(ClientKind::parse("1"), Some(ClientKind::Transmission));
        assert_eq!(ClientKind::parse("qbit"), Some(ClientKind::QBittorrent));
        assert_eq!(ClientKind::parse("utorrent"), None);
        let kind: ClientKind = serde_json::from_str("\"qbittorrent\"").unwrap();
        assert_eq!(kind, ClientKind::QBittorrent);
    }

    #[test]
    fn test_status_from_percent() {
        let status = TorrentStatus::from_percent(99.97, 10, 11);
        assert_eq!(status.percent, 99);
        assert!(!status.is_complete());
        assert!(TorrentStatus::from_percent(100.4, 11, 11).is_complete());
        assert_eq!(TorrentStatus::from_percent(-1.0, 0, 0).percent, 0);
    }

    #[test]
    fn test_destination_for_kind() {
        let mut config = TorrentClientConfig::default();
        assert_eq!(config.destination_for(MediaKind::Serial), "watch/serials");
        config.kind = ClientKind::Deluge;
        assert_eq!(config.destination_for(MediaKind::Film), "/downloads/films");
        assert_eq!(config.destination_for(MediaKind::Serial), "/downloads/serials");
    }

    #[tokio::test]
    async fn test_build_folder_backend() {
        let backend = build_backend(&TorrentClientConfig::default()).unwrap();
        assert_eq!(backend.kind(), ClientKind::Folder);
        assert!(!backend.tracks_progress());
    }
}
