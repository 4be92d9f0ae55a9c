//! Transmission backend over its RPC endpoint.
//!
//! Transmission answers 409 with a fresh `X-Transmission-Session-Id` when
//! the session header is missing or stale; the request is then repeated.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::{ClientKind, TorrentClientBackend, TorrentStatus};
use crate::bus::TorrentPayload;
use crate::config::TorrentClientConfig;
use crate::{Error, Result};

const SESSION_HEADER: &str = "X-Transmission-Session-Id";

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddedTorrent {
    hash_string: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TorrentFields {
    percent_done: f64,
    size_when_done: u64,
    left_until_done: u64,
}

impl From<TorrentFields> for TorrentStatus {
    fn from(fields: TorrentFields) -> Self {
        TorrentStatus::from_percent(
            fields.percent_done * 100.0,
            fields.size_when_done.saturating_sub(fields.left_until_done),
            fields.size_when_done,
        )
    }
}

pub struct TransmissionBackend {
    endpoint: String,
    user: String,
    password: String,
    client: Client,
    session_id: Mutex<Option<String>>,
}

impl TransmissionBackend {
    pub fn new(config: &TorrentClientConfig, client: Client) -> Self {
        Self {
            endpoint: format!("{}/transmission/rpc", config.base_url()),
            user: config.user.clone(),
            password: config.password.clone(),
            client,
            session_id: Mutex::new(None),
        }
    }

    fn error(message: impl Into<String>) -> Error {
        Error::torrent_client(ClientKind::Transmission.as_str(), message)
    }

    async fn call(&self, method: &str, arguments: Value) -> Result<Value> {
        let body = json!({ "method": method, "arguments": arguments });
        let mut session_id = self.session_id.lock().await;

        for _ in 0..2 {
            let mut request = self.client.post(&self.endpoint).json(&body);
            if !self.user.is_empty() {
                request = request.basic_auth(&self.user, Some(&self.password));
            }
            if let Some(id) = session_id.as_deref() {
                request = request.header(SESSION_HEADER, id);
            }

            let response = request.send().await?;
            if response.status() == StatusCode::CONFLICT {
                *session_id = response
                    .headers()
                    .get(SESSION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                continue;
            }

            let rpc: RpcResponse = response.error_for_status()?.json().await?;
            if rpc.result != "success" {
                return Err(Self::error(format!("{method}: {}", rpc.result)));
            }
            return Ok(rpc.arguments);
        }

        Err(Self::error("session id handshake failed"))
    }
}

#[async_trait]
impl TorrentClientBackend for TransmissionBackend {
    fn kind(&self) -> ClientKind {
        ClientKind::Transmission
    }

    async fn add_torrent(&self, torrent: &TorrentPayload, destination: &str) -> Result<String> {
        let mut arguments = self
            .call(
                "torrent-add",
                json!({
                    "metainfo": STANDARD.encode(&torrent.data),
                    "download-dir": destination,
                }),
            )
            .await?;

        let added = ["torrent-added", "torrent-duplicate"]
            .into_iter()
            .find_map(|key| arguments.get_mut(key).map(Value::take))
            .ok_or_else(|| Self::error("torrent-add returned no torrent"))?;
        let added: AddedTorrent = serde_json::from_value(added)?;
        Ok(added.hash_string)
    }

    async fn status(&self, handle: &str) -> Result<TorrentStatus> {
        let mut arguments = self
            .call(
                "torrent-get",
                json!({
                    "ids": [handle],
                    "fields": ["percentDone", "sizeWhenDone", "leftUntilDone"],
                }),
            )
            .await?;

        let torrents = arguments
            .get_mut("torrents")
            .map(Value::take)
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let torrents: Vec<TorrentFields> = serde_json::from_value(torrents)?;
        torrents
            .into_iter()
            .next()
            .map(TorrentStatus::from)
            .ok_or_else(|| Error::not_found("torrent", handle))
    }
}
