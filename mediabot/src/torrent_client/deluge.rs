//! Deluge backend over the web UI JSON-RPC endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use reqwest::header::{COOKIE, SET_COOKIE};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::debug;

use super::{ClientKind, TorrentClientBackend, TorrentStatus};
use crate::bus::TorrentPayload;
use crate::config::TorrentClientConfig;
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DelugeStatus {
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    total_done: u64,
    #[serde(default)]
    total_size: u64,
}

pub struct DelugeBackend {
    endpoint: String,
    password: String,
    client: Client,
    /// `_session_id` cookie from the last successful login.
    session: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl DelugeBackend {
    pub fn new(config: &TorrentClientConfig, client: Client) -> Self {
        Self {
            endpoint: format!("{}/json", config.base_url()),
            password: config.password.clone(),
            client,
            session: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    fn error(message: impl Into<String>) -> Error {
        Error::torrent_client(ClientKind::Deluge.as_str(), message)
    }

    async fn post(
        &self,
        cookie: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<reqwest::Response> {
        let body = json!({
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        Ok(request.send().await?.error_for_status()?)
    }

    async fn login(&self) -> Result<String> {
        let response = self.post(None, "auth.login", json!([self.password])).await?;

        let cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| v.split(';').next().filter(|c| c.starts_with("_session_id=")))
            .map(str::to_string);

        let rpc: RpcResponse = response.json().await?;
        match (rpc.result, cookie) {
            (Some(Value::Bool(true)), Some(cookie)) => {
                debug!("Logged in to deluge");
                Ok(cookie)
            }
            _ => Err(Self::error("login rejected")),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let mut session = self.session.lock().await;
        let cookie = match session.as_ref() {
            Some(cookie) => cookie.clone(),
            None => {
                let cookie = self.login().await?;
                *session = Some(cookie.clone());
                cookie
            }
        };

        let rpc: RpcResponse = self.post(Some(&cookie), method, params).await?.json().await?;
        if let Some(error) = rpc.error {
            // Expired sessions surface as RPC errors; log in again next time.
            *session = None;
            return Err(Self::error(format!("{method}: {}", error.message)));
        }
        rpc.result
            .ok_or_else(|| Self::error(format!("{method}: empty result")))
    }
}

#[async_trait]
impl TorrentClientBackend for DelugeBackend {
    fn kind(&self) -> ClientKind {
        ClientKind::Deluge
    }

    async fn add_torrent(&self, torrent: &TorrentPayload, destination: &str) -> Result<String> {
        let result = self
            .call(
                "core.add_torrent_file",
                json!([
                    format!("{}.torrent", torrent.id),
                    STANDARD.encode(&torrent.data),
                    { "download_location": destination },
                ]),
            )
            .await?;

        match result {
            Value::String(id) => Ok(id),
            other => Err(Self::error(format!("unexpected torrent id {other}"))),
        }
    }

    async fn status(&self, handle: &str) -> Result<TorrentStatus> {
        let result = self
            .call(
                "core.get_torrent_status",
                json!([handle, ["progress", "total_done", "total_size"]]),
            )
            .await?;

        let status: DelugeStatus = serde_json::from_value(result)?;
        if status.total_size == 0 && status.progress == 0.0 {
            return Err(Error::not_found("torrent", handle));
        }
        Ok(TorrentStatus::from_percent(
            status.progress,
            status.total_done,
            status.total_size,
        ))
    }
}
