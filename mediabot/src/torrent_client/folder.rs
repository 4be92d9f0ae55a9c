//! Watch-directory backend: writes the torrent file for an external client.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use super::{ClientKind, TorrentClientBackend, TorrentStatus};
use crate::bus::TorrentPayload;
use crate::{Error, Result};

pub struct FolderBackend;

#[async_trait]
impl TorrentClientBackend for FolderBackend {
    fn kind(&self) -> ClientKind {
        ClientKind::Folder
    }

    fn tracks_progress(&self) -> bool {
        false
    }

    async fn add_torrent(&self, torrent: &TorrentPayload, destination: &str) -> Result<String> {
        let dir = Path::new(destination);
        tokio::fs::create_dir_all(dir).await?;

        let name = if torrent.id.is_empty() {
            "download".to_string()
        } else {
            torrent.id.clone()
        };
        let path = dir.join(format!("{name}.torrent"));
        tokio::fs::write(&path, &torrent.data).await?;

        info!(path = %path.display(), "Torrent file saved to watch folder");
        Ok(path.display().to_string())
    }

    async fn status(&self, _handle: &str) -> Result<TorrentStatus> {
        Err(Error::torrent_client(
            ClientKind::Folder.as_str(),
            "watch folders do not report progress",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_writes_named_torrent_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("films");
        let torrent = TorrentPayload {
            id: "4521".to_string(),
            data: Bytes::from_static(b"d4:infod4:name1:aee"),
        };

        let handle = FolderBackend
            .add_torrent(&torrent, dest.to_str().unwrap())
            .await
            .unwrap();

        let written = std::fs::read(dest.join("4521.torrent")).unwrap();
        assert_eq!(written, b"d4:infod4:name1:aee");
        assert!(handle.ends_with("4521.torrent"));
        assert!(FolderBackend.status(&handle).await.is_err());
    }
}
