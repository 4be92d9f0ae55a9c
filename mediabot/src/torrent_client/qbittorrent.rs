//! qBittorrent backend over Web API v2.
//!
//! The handle of an added torrent is its info hash, computed locally.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{COOKIE, REFERER, SET_COOKIE};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ClientKind, TorrentClientBackend, TorrentStatus};
use crate::bus::TorrentPayload;
use crate::config::TorrentClientConfig;
use crate::trackers::metainfo;
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct TorrentInfo {
    progress: f64,
    #[serde(default)]
    completed: u64,
    #[serde(default)]
    total_size: u64,
}

pub struct QBittorrentBackend {
    base_url: String,
    user: String,
    password: String,
    client: Client,
    /// `SID` cookie from the last successful login.
    session: Mutex<Option<String>>,
}

impl QBittorrentBackend {
    pub fn new(config: &TorrentClientConfig, client: Client) -> Self {
        Self {
            base_url: config.base_url(),
            user: config.user.clone(),
            password: config.password.clone(),
            client,
            session: Mutex::new(None),
        }
    }

    fn error(message: impl Into<String>) -> Error {
        Error::torrent_client(ClientKind::QBittorrent.as_str(), message)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.base_url, path)
    }

    async fn session(&self) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some(sid) = session.as_ref() {
            return Ok(sid.clone());
        }

        let response = self
            .client
            .post(self.url("auth/login"))
            .header(REFERER, &self.base_url)
            .form(&[("username", &self.user), ("password", &self.password)])
            .send()
            .await?
            .error_for_status()?;

        let sid = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| v.split(';').next().filter(|c| c.starts_with("SID=")))
            .map(str::to_string);
        let body = response.text().await?;

        match sid {
            Some(sid) if body.trim() == "Ok." => {
                debug!("Logged in to qBittorrent");
                *session = Some(sid.clone());
                Ok(sid)
            }
            _ => Err(Self::error("login rejected")),
        }
    }

    async fn forget_session(&self) {
        *self.session.lock().await = None;
    }
}

#[async_trait]
impl TorrentClientBackend for QBittorrentBackend {
    fn kind(&self) -> ClientKind {
        ClientKind::QBittorrent
    }

    async fn add_torrent(&self, torrent: &TorrentPayload, destination: &str) -> Result<String> {
        let hash = metainfo::info_hash(&torrent.data)?;
        let sid = self.session().await?;

        let part = Part::bytes(torrent.data.to_vec())
            .file_name(format!("{}.torrent", torrent.id))
            .mime_str("application/x-bittorrent")?;
        let form = Form::new()
            .part("torrents", part)
            .text("savepath", destination.to_string());

        let response = self
            .client
            .post(self.url("torrents/add"))
            .header(COOKIE, sid)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            self.forget_session().await;
            return Err(Self::error(format!(
                "torrents/add returned HTTP {}",
                response.status()
            )));
        }
        Ok(hash)
    }

    async fn status(&self, handle: &str) -> Result<TorrentStatus> {
        let sid = self.session().await?;
        let response = self
            .client
            .get(self.url("torrents/info"))
            .query(&[("hashes", handle)])
            .header(COOKIE, sid)
            .send()
            .await?;

        if !response.status().is_success() {
            self.forget_session().await;
            return Err(Self::error(format!(
                "torrents/info returned HTTP {}",
                response.status()
            )));
        }

        let torrents: Vec<TorrentInfo> = response.json().await?;
        torrents
            .into_iter()
            .next()
            .map(|t| TorrentStatus::from_percent(t.progress * 100.0, t.completed, t.total_size))
            .ok_or_else(|| Error::not_found("torrent", handle))
    }
}
